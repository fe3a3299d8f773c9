use std::process;

use clap::Parser;
use env_logger::Env;

use fitpop::cli::{display_function_list, validate_args_or_exit};
use fitpop::workflow::{describe_best, search_space};
use fitpop::{Args, RunOutcome, run};

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.function_list {
        display_function_list();
    }
    validate_args_or_exit(&args);

    let report = match run(&args) {
        Ok(RunOutcome::Finished(report)) => report,
        Ok(outcome @ RunOutcome::Interrupted { .. }) => {
            log::info!("interrupted after saving progress, run again to resume");
            process::exit(outcome.exit_code());
        }
        Err(e) => {
            eprintln!("❌ {e}");
            process::exit(1);
        }
    };

    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("❌ could not serialize report: {e}");
                process::exit(1);
            }
        }
    } else {
        let status = if report.optimal { "✅ Converged" } else { "⚠️  Stopped" };
        println!(
            "{status} after {} generations ({} evaluations{})",
            report.generations,
            report.evaluations,
            if report.resumed { ", resumed" } else { "" }
        );
        println!("   best value: {}", report.best.value);
        if let Ok(space) = search_space(&args) {
            for line in describe_best(&space, &report.best) {
                println!("   {line}");
            }
        }
    }

    let outcome = RunOutcome::Finished(report);
    if outcome.exit_code() != 0 {
        eprintln!("❌ some workers did not acknowledge shutdown");
        process::exit(outcome.exit_code());
    }
}
