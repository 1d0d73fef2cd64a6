//! Command-line interface for scl-validation

#[cfg(feature = "cli")]
use clap::{Args, Parser, Subcommand};

#[cfg(feature = "cli")]
use std::fs;
#[cfg(feature = "cli")]
use std::path::PathBuf;
#[cfg(feature = "cli")]
use std::sync::Arc;

#[cfg(feature = "cli")]
use scl_validation::{
    Issue, NsdStore, SchemaValidationDispatcher, SchemaVariant, SclDocument, ValidationConfig,
    ValidationPanel, SCHEMA_VALID_TITLE,
};

#[cfg(feature = "cli")]
#[derive(Parser, Debug)]
#[command(name = "scl-validate")]
#[command(author, version, about = "IEC 61850 SCL schema and template validation", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print issues as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Args, Debug)]
struct Target {
    /// SCL project file
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Display name used in issue messages (defaults to the file name)
    #[arg(long)]
    name: Option<String>,
}

#[cfg(feature = "cli")]
#[derive(Args, Debug)]
struct SchemaOptions {
    /// Validate against this schema instead of the declared version: 2003, 2007B, 2007B4, default
    #[arg(long)]
    schema: Option<SchemaVariant>,
}

#[cfg(feature = "cli")]
#[derive(Args, Debug)]
struct TemplateOptions {
    /// Directory containing public/xml/*.nsd
    #[arg(long, value_name = "DIR")]
    nsd_root: Option<PathBuf>,
}

#[cfg(feature = "cli")]
#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a project against its SCL schema
    Schema {
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        options: SchemaOptions,
    },

    /// Validate a project's data type templates against the NSD files
    Templates {
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        options: TemplateOptions,
    },

    /// Run both validations
    All {
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        schema: SchemaOptions,
        #[command(flatten)]
        templates: TemplateOptions,
    },
}

#[cfg(feature = "cli")]
fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    }
}

#[cfg(feature = "cli")]
fn init_logging(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Returns whether the project passed every requested check
#[cfg(feature = "cli")]
fn run(cli: Cli) -> Result<bool, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => ValidationConfig::from_file(path)?,
        None => ValidationConfig::default(),
    };

    let (target, variant, nsd_root, run_schema, run_templates) = match cli.command {
        Commands::Schema { target, options } => (target, options.schema, None, true, false),
        Commands::Templates { target, options } => (target, None, options.nsd_root, false, true),
        Commands::All {
            target,
            schema,
            templates,
        } => (target, schema.schema, templates.nsd_root, true, true),
    };
    if let Some(root) = nsd_root {
        config = config.with_nsd_root(root);
    }
    config.check()?;

    let text = fs::read(&target.file)?;
    let doc = SclDocument::parse(&text, &config.limits)?;
    let name = target.name.unwrap_or_else(|| {
        target
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| target.file.display().to_string())
    });

    let mut panel = ValidationPanel::new(doc, name)
        .with_dispatcher(Arc::new(SchemaValidationDispatcher::new(&config)))
        .with_nsd_store(Arc::new(NsdStore::new(&config)));
    if let Some(variant) = variant {
        panel = panel.with_schema_variant(variant);
    }

    let schema_issues = if run_schema {
        Some(panel.validate_schema()?)
    } else {
        None
    };
    let template_issues = if run_templates {
        Some(panel.validate_templates()?)
    } else {
        None
    };

    if cli.json {
        let report = serde_json::json!({
            "file": panel.doc_name(),
            "schema": schema_issues,
            "templates": template_issues,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        if let Some(issues) = &schema_issues {
            print_issues("Schema", issues);
        }
        if let Some(issues) = &template_issues {
            print_issues("Templates", issues);
        }
    }

    let schema_ok = schema_issues
        .as_ref()
        .map_or(true, |issues| issues.iter().any(|i| i.title == SCHEMA_VALID_TITLE));
    let templates_ok = template_issues.as_ref().map_or(true, Vec::is_empty);
    Ok(schema_ok && templates_ok)
}

#[cfg(feature = "cli")]
fn print_issues(heading: &str, issues: &[Issue]) {
    println!("{} ({} issues)", heading, issues.len());
    for issue in issues {
        match &issue.message {
            Some(message) => println!("  - {}\n      {}", issue.title, message),
            None => println!("  - {}", issue.title),
        }
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Rebuild with --features cli");
    std::process::exit(1);
}
