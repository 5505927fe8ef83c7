use clap::Parser;

use cloud_cert_renewer::cli::{self, Args};
use cloud_cert_renewer::logging;

fn main() {
    let args = Args::parse();
    logging::init(args.verbose, args.quiet);
    let code = cli::run(&args);
    std::process::exit(code.as_i32());
}
