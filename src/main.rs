use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use finding_home::attributes::{load_attributes, AttributeStore};
use finding_home::config::AppConfig;
use finding_home::render::render_summary_text;
use finding_home::selection::Selection;
use finding_home::view::build_view;
use finding_home::{open_stores, server};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the dashboard
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        /// Overrides `server.port` from the config file
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print every municipality name offered by the selector
    Cities {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Print the summary for one municipality
    Show {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        #[arg(long)]
        city: String,
        /// Also write the municipality boundary as GeoJSON
        #[arg(long = "geojson", value_name = "FILE")]
        geojson_out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, port } => {
            info!("Serving dashboard with config: {:?}", config);
            let mut app_config = AppConfig::load_from_file(&config)?;
            if let Some(port) = port {
                app_config.server.port = port;
            }

            let stores = open_stores(&app_config)?;
            server::start_server(app_config, stores).await?;
        }
        Commands::Cities { config } => {
            let app_config = AppConfig::load_from_file(&config)?;
            let table = load_attributes(&app_config)?;
            for name in table.list_names() {
                println!("{}", name);
            }
        }
        Commands::Show {
            config,
            city,
            geojson_out,
        } => {
            let app_config = AppConfig::load_from_file(&config)?;
            let stores = open_stores(&app_config)?;

            let mut selection = Selection::default();
            selection.select(&city);
            let view = build_view(&stores, &selection, app_config.display.table_rows);

            let summary = view
                .summary
                .as_ref()
                .ok_or_else(|| anyhow!("No municipality named '{}'", city))?;
            print!("{}", render_summary_text(summary));

            if let Some(out) = geojson_out {
                let map = view
                    .map
                    .as_ref()
                    .ok_or_else(|| anyhow!("No geometry for {}", summary.name))?;
                let out_json = geojson::GeoJson::from(map.features.clone()).to_string();
                std::fs::write(&out, out_json)
                    .with_context(|| format!("Failed to write GeoJSON: {:?}", out))?;
                info!("Wrote boundary of {} to {:?}", summary.name, out);
            }
        }
    }

    Ok(())
}
