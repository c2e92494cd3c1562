use std::process::exit;

use structopt::StructOpt;

use haploblocks::cli::{run, Haploblocks};

pub fn main() {
    let opt = Haploblocks::from_args();

    // setup logger
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!("[{}] {}", record.level(), message))
        })
        .level(log::LevelFilter::Info)
        .chain(std::io::stderr())
        .apply()
        .unwrap();

    exit(match run(opt) {
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
        _ => 0,
    })
}
