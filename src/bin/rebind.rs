extern crate rebind;

use std::process;

use rebind::driver::options::RebindOptions;
use rebind::driver::{eval, statistics::Statistics};
use structopt::StructOpt;

pub fn main() {
    env_logger::init();

    let opt = RebindOptions::from_args();

    // For a dry run, just explain the options
    if opt.explain() {
        println!("{}", opt.explanation());
        process::exit(0);
    }

    // run manages error reporting
    match eval::run(&opt) {
        Ok(stats) => exit(&opt, 0, &stats),
        Err(_) => exit(&opt, 1, &Statistics::default()),
    }
}

/// Optionally dump stats to stderr then exit
pub fn exit(opts: &RebindOptions, code: i32, stats: &Statistics) {
    if opts.statistics() {
        eprintln!();
        eprintln!("~~~~~~~~~~");
        eprintln!("STATISTICS");
        eprintln!("~~~~~~~~~~");
        eprintln!();
        eprintln!("{stats}");
    }
    process::exit(code)
}
