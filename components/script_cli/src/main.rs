//! corten-script
//!
//! Entry point for the script runtime. Parses CLI arguments and delegates
//! to the Runtime for execution.

use std::rc::Rc;

use clap::Parser as ClapParser;
use interpreter::StdioSink;
use script_cli::{repl, Cli, CliError, CliResult, Runtime};
use tracing_subscriber::EnvFilter;

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> CliResult<()> {
    let executor = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let mut runtime = Runtime::new(cli.runtime_config()).with_sink(Rc::new(StdioSink));

    if let Some(path) = &cli.file {
        let source = std::fs::read_to_string(path)?;
        executor.block_on(async {
            runtime.async_run(&source).await?;
            runtime.run_until_idle().await;
            Ok::<_, CliError>(())
        })?;
    }

    if let Some(expression) = &cli.eval {
        let value = runtime.execute(expression, interpreter::CompileMode::Eval)?;
        let mut vm = runtime.vm_mut();
        let pin = vm.pin(value);
        let text = if cli.json {
            let dynamic = <bridge::Dynamic as bridge::FromScript>::from_script(&mut vm, pin.value());
            serde_json::to_string(&dynamic)?
        } else {
            vm.repr(pin.value()).map_err(|e| e.into_script_error())?
        };
        println!("{}", text);
    }

    if cli.is_interactive() {
        repl::run_repl(&mut runtime, &executor)?;
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    if let Err(e) = run(cli) {
        // Script failures were already reported through the sink.
        if !matches!(e, CliError::Script(_)) {
            eprintln!("{}", e);
        }
        std::process::exit(e.exit_code());
    }
}
