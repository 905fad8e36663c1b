use std::collections::HashMap;
use std::sync::Arc;

use logsift::cli::{self, exit_code};
use logsift::config::SiftConfig;
use logsift::runtime::SiftRuntime;
use logsift::shutdown::ShutdownCoordinator;
use logsift::tracing_setup::{Verbosity, init_subscriber};

fn main() {
    let cli_input = match cli::parse_cli_args(std::env::args().skip(1)) {
        Ok(input) => input,
        Err(error) => {
            eprintln!("{error}");
            eprint!("{}", cli::USAGE);
            std::process::exit(exit_code::USAGE_ERROR);
        }
    };

    if cli_input.show_version {
        println!("logsift {}", env!("CARGO_PKG_VERSION"));
        std::process::exit(exit_code::OK);
    }
    if cli_input.show_help {
        print!("{}", cli::USAGE);
        std::process::exit(exit_code::OK);
    }

    // Initialize tracing before config resolution so its warnings are seen.
    let verbosity = Verbosity::from_flags(cli_input.verbose, cli_input.quiet);
    init_subscriber(verbosity, cli_input.no_color);

    if cli_input.watch_path.is_none() {
        eprintln!("missing required <watch_path>");
        eprint!("{}", cli::USAGE);
        std::process::exit(exit_code::USAGE_ERROR);
    }

    let env_map: HashMap<String, String> = std::env::vars().collect();
    let config = match SiftConfig::from_sources(&cli_input, &env_map) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("{error}");
            std::process::exit(exit_code::USAGE_ERROR);
        }
    };

    let shutdown = Arc::new(ShutdownCoordinator::new());
    if let Err(error) = shutdown.register_signals() {
        eprintln!("{error}");
        std::process::exit(exit_code::RUNTIME_ERROR);
    }

    let runtime = SiftRuntime::new(config);
    let run_result = runtime.run(&shutdown);
    shutdown.stop_signal_listener();

    if shutdown.is_force_exit_requested() {
        std::process::exit(exit_code::INTERRUPTED);
    }
    if let Err(error) = run_result {
        eprintln!("{error}");
        std::process::exit(exit_code::RUNTIME_ERROR);
    }
}
