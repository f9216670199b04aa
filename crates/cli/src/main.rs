use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result, bail};
use clap::{Arg, ArgAction, ArgMatches, Command};
use gqlcompose_engine::{
    AccessGate, DocumentSchemaExtension, Executor, GrantedCapabilities, Operation, Principal, RequestContext, RequestHeaders,
    RouteTable, RouteTableBuilder, Schema, SchemaExtension, Settings, default_settings_path, load_settings_from_path,
    parse_schema_document, read_settings_file, save_settings,
};
use gqlcompose_producers::{MemoryStore, select_extensions};
use tracing::info;
use tracing_subscriber::EnvFilter;

const CONFIG_PAGES_COLLECTION_PATH: &str = "/admin/structure/translatable-config-pages";

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let matches = cli().get_matches();

    let settings_path = matches
        .get_one::<PathBuf>("settings")
        .cloned()
        .unwrap_or_else(default_settings_path);

    match matches.subcommand() {
        Some(("check", sub)) => run_check(&settings_path, sub),
        Some(("query", sub)) => run_query(&settings_path, sub).await,
        Some(("routes", _)) => run_routes(&settings_path),
        Some(("upgrade-config", sub)) => run_upgrade_config(&settings_path, sub),
        _ => bail!("expected a subcommand; see --help"),
    }
}

fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_writer(std::io::stderr)
        .try_init();
}

fn cli() -> Command {
    let fixture = Arg::new("fixture")
        .long("fixture")
        .short('f')
        .action(ArgAction::Set)
        .value_parser(clap::value_parser!(PathBuf))
        .help("JSON fixture backing entities, config pages, menus and views");
    let document = Arg::new("schema")
        .long("schema")
        .action(ArgAction::Set)
        .value_parser(clap::value_parser!(PathBuf))
        .help("Schema document (YAML/JSON) with additional producer pipelines");

    Command::new("gqlcompose")
        .about("Compose GraphQL field resolvers from data producer pipelines")
        .arg_required_else_help(true)
        .arg(
            Arg::new("settings")
                .long("settings")
                .global(true)
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(PathBuf))
                .help("Settings file; defaults to GQLCOMPOSE_SETTINGS_PATH or the user config dir"),
        )
        .subcommand(
            Command::new("check")
                .about("Build the schema and print every field's resolution plan")
                .arg(fixture.clone())
                .arg(document.clone()),
        )
        .subcommand(
            Command::new("query")
                .about("Execute an operation (JSON selection tree) against the fixture")
                .arg(
                    Arg::new("operation")
                        .required(true)
                        .value_parser(clap::value_parser!(PathBuf))
                        .help("Operation JSON file"),
                )
                .arg(fixture.clone())
                .arg(document)
                .arg(Arg::new("principal").long("principal").action(ArgAction::Set).help("Principal id; anonymous when omitted"))
                .arg(
                    Arg::new("capability")
                        .long("capability")
                        .short('c')
                        .action(ArgAction::Append)
                        .help("Capability granted to the principal (repeatable)"),
                )
                .arg(Arg::new("token").long("token").action(ArgAction::Set).help("Value sent in the configured token header"))
                .arg(Arg::new("language").long("language").action(ArgAction::Set).help("Request language"))
                .arg(
                    Arg::new("route")
                        .long("route")
                        .action(ArgAction::Set)
                        .help("Execute through the named route so its requirements apply"),
                )
                .arg(Arg::new("format").long("format").action(ArgAction::Set).help("Request format checked by routes")),
        )
        .subcommand(Command::new("routes").about("Print the route table built from the configured servers"))
        .subcommand(
            Command::new("upgrade-config")
                .about("Apply pending schema configuration migrations")
                .arg(fixture)
                .arg(
                    Arg::new("dry-run")
                        .long("dry-run")
                        .action(ArgAction::SetTrue)
                        .help("Print the upgraded settings instead of writing them"),
                ),
        )
}

fn load_store(matches: &ArgMatches) -> Result<Arc<MemoryStore>> {
    let store = match matches.get_one::<PathBuf>("fixture") {
        Some(path) => MemoryStore::load_from_path(path)?,
        None => MemoryStore::default(),
    };
    Ok(Arc::new(store))
}

fn build_schema(settings: &Settings, matches: &ArgMatches) -> Result<Schema> {
    let store = load_store(matches)?;
    let mut extensions: Vec<Arc<dyn SchemaExtension>> =
        select_extensions(store, settings.environment_indicator.clone(), settings.extensions.as_deref());
    if let Some(path) = matches.get_one::<PathBuf>("schema") {
        let document = parse_schema_document(path)?;
        extensions.push(Arc::new(DocumentSchemaExtension::new("schema_document", document)));
    }

    let schema = Schema::build(&extensions, &settings.schema)?;
    info!(extensions = extensions.len(), fields = schema.fields().len(), "schema ready");
    Ok(schema)
}

fn route_table(settings: &Settings) -> RouteTable {
    RouteTableBuilder::new()
        .servers(&settings.servers)
        .with_config_pages_collection(CONFIG_PAGES_COLLECTION_PATH)
        .build()
}

fn run_check(settings_path: &Path, matches: &ArgMatches) -> Result<()> {
    let settings = load_settings_from_path(settings_path)?;
    let schema = build_schema(&settings, matches)?;

    let plans: Vec<_> = schema.fields().iter().map(|(_, _, pipeline)| pipeline.plan()).collect();
    println!("{}", serde_json::to_string_pretty(&plans)?);
    Ok(())
}

async fn run_query(settings_path: &Path, matches: &ArgMatches) -> Result<()> {
    let settings = load_settings_from_path(settings_path)?;
    let schema = build_schema(&settings, matches)?;

    let operation_path = matches
        .get_one::<PathBuf>("operation")
        .context("an operation file is required")?;
    let content = std::fs::read_to_string(operation_path)
        .with_context(|| format!("failed to read operation {}", operation_path.display()))?;
    let operation: Operation =
        serde_json::from_str(&content).with_context(|| format!("invalid operation JSON in {}", operation_path.display()))?;

    let mut principal = match matches.get_one::<String>("principal") {
        Some(id) => Principal::new(id),
        None => Principal::anonymous(),
    };
    for capability in matches.get_many::<String>("capability").into_iter().flatten() {
        principal = principal.with_capability(capability);
    }

    let mut headers = RequestHeaders::new();
    if let Some(token) = matches.get_one::<String>("token") {
        headers.insert(&settings.access.header, token.as_str());
    }
    let language = matches
        .get_one::<String>("language")
        .cloned()
        .unwrap_or_else(|| settings.default_language.clone());
    let mut request = RequestContext::new(principal, language).with_headers(headers);
    if let Some(format) = matches.get_one::<String>("format") {
        request = request.with_format(format);
    }

    let executor = Executor::new(Arc::new(schema), AccessGate::new(settings.access.policy(), Arc::new(GrantedCapabilities)));
    let response = match matches.get_one::<String>("route") {
        Some(name) => {
            let routes = route_table(&settings);
            let route = routes.get(name).with_context(|| format!("unknown route '{name}'"))?;
            executor.execute_route(route, &operation, request).await
        }
        None => executor.execute(&operation, request).await,
    };

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn run_routes(settings_path: &Path) -> Result<()> {
    let settings = load_settings_from_path(settings_path)?;
    println!("{}", serde_yaml::to_string(&route_table(&settings))?);
    Ok(())
}

fn run_upgrade_config(settings_path: &Path, matches: &ArgMatches) -> Result<()> {
    let mut settings = read_settings_file(settings_path)?;
    let store = load_store(matches)?;

    let applied = settings.schema.upgrade(&gqlcompose_producers::EntityStore::bundles(store.as_ref()));
    if applied.is_empty() {
        info!(path = %settings_path.display(), "schema configuration is up to date");
        return Ok(());
    }
    info!(migrations = ?applied, "schema configuration upgraded");

    if matches.get_flag("dry-run") {
        println!("{}", serde_yaml::to_string(&settings)?);
        return Ok(());
    }
    save_settings(settings_path, &settings)?;
    println!("Applied {} migration(s) to {}", applied.len(), settings_path.display());
    Ok(())
}
