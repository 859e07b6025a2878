use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use mosaic::cli::{Args, Command};
use mosaic::context::{project_root, BuildContext};
use mosaic::{compose, report};

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("warn,mosaic=debug")
        } else {
            EnvFilter::new("warn,mosaic=info")
        }
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let root = project_root(args.root.as_deref())?;
    let ctx = BuildContext::load(&root, args.config.as_deref())?;

    match args.command {
        Command::Graph => {
            let graph = compose::build_graph(&ctx).await?;
            print!("{}", report::graph_report(&graph));
        }
        Command::Namespaces { namespace } => {
            let (_, namespaces) = compose::resolve(&ctx, &[]).await?;
            print!("{}", report::namespace_report(&namespaces, namespace.as_deref()));
        }
        Command::Build => {
            let out = compose::build(&ctx).await?;
            println!("outputs written to {}", out.out_dir.display());
        }
        Command::Report { mode } => {
            let (graph, namespaces) = compose::resolve(&ctx, &[]).await?;
            print!("{}", report::build_report(&graph, &namespaces, mode));
        }
    }

    Ok(())
}
