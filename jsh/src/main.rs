use clap::Parser;
use jsh::{Session, ShellError, ShellResult};
use jsh_config::{JshConfig, LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

mod completer;
mod editor;

/// jsh - Interactive shell with statement rewriting and job tracking
#[derive(Parser, Debug)]
#[command(name = "jsh", version, about)]
struct Args {
    /// Configuration file (skips the standard search path)
    #[arg(long)]
    config: Option<String>,

    /// Log at debug level regardless of configuration
    #[arg(long)]
    debug: bool,

    /// Execute command and exit
    #[arg(short = 'c')]
    command: Option<String>,

    /// Script file to execute
    script: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let loaded = match &args.config {
        Some(path) => jsh_config::load_from_file(path),
        None => jsh_config::load(),
    };
    let config = loaded.unwrap_or_else(|e| {
        eprintln!("jsh: {e}; using default configuration");
        JshConfig::default()
    });
    init_logging(&config.logging, args.debug);

    let code = match run(&args, &config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("jsh: {e}");
            1
        }
    };
    std::process::exit(code);
}

/// `RUST_LOG` wins over the configured filter; `--debug` wins over both.
fn init_logging(logging: &LoggingConfig, debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(logging.directive()))
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match logging.format {
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

fn status(result: ShellResult<bool>) -> ShellResult<i32> {
    match result {
        Ok(success) => Ok(i32::from(!success)),
        Err(ShellError::Exit(code)) => Ok(code),
        Err(ShellError::EndOfInput) => Ok(0),
        Err(e) => Err(e),
    }
}

async fn run(args: &Args, config: &JshConfig) -> ShellResult<i32> {
    let mut session = Session::builder().config(config).build()?;
    tracing::debug!(cwd = ?session.cwd(), env_file = ?session.env.file(), "Session ready");

    let work = async {
        if let Some(command) = &args.command {
            status(session.execute(command).await)
        } else if let Some(script) = &args.script {
            let path = session.resolve_path(script);
            status(session.execute_script(&path, &[]).await)
        } else {
            let terminal = editor::Terminal::spawn(
                &config.shell.history,
                session.builtins().names().collect(),
                session.history_handle(),
            )?;
            session.set_terminal(terminal);
            println!("jsh v{}", env!("CARGO_PKG_VERSION"));
            println!("Type 'exit' to quit, 'help' for help.");
            println!();
            session.interact().await
        }
    };

    let result = tokio::select! {
        result = work => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::debug!("Interrupted");
            Ok(130)
        }
    };

    session.io.reset();
    session.shutdown().await;
    result
}
