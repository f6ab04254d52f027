mod cli;
mod dump;
mod error;
mod report;
mod workload;

use clap::Parser;

use error::AppError;

fn main() {
    env_logger::init();

    let opt = cli::Opt::parse();
    let result = match opt.action {
        cli::Action::Run(args) => do_run_action(args),
        cli::Action::Dump(args) => do_dump_action(args),
    };

    if let Err(err) = result {
        eprintln!("byfl: {err}");
        std::process::exit(1);
    }
}

fn do_run_action(args: cli::RunArgs) -> Result<(), AppError> {
    let module = workload::build(args.workload);
    log::info!("running workload {:?} ({} function(s))", args.workload, module.functions.len());

    let state = byfl_pass::run_module(&module, &args.pass_config, None)?;
    log::info!(
        "{} load(s), {} store(s), {} flop(s)",
        state.global_totals().loads,
        state.global_totals().stores,
        state.global_totals().flops
    );

    report::write_report(&state, &args.pass_config, &args.output)?;
    println!("wrote {}", args.output.display());
    Ok(())
}

fn do_dump_action(args: cli::DumpArgs) -> Result<(), AppError> {
    let mut dumper = dump::TextDumper::default();
    byfl_binout::process_byfl_file(&args.file, args.live, &mut dumper)?;
    Ok(())
}
