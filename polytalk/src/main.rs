//! Command-line entry point for the polytalk bridge.

use clap::{App, Arg};
use log::LevelFilter;
use polytalk::config::Config;
use polytalk::supervisor;
use std::process;

const VERSION_STRING: &str = "polytalk 0.1";

fn main() {
    let matches = App::new("polytalk")
        .about("Bridge AppleTalk networks across EtherTalk, LocalTalk, and IP transports")
        .arg(
            Arg::with_name("ethertalk")
                .short("e")
                .long("ethertalk")
                .value_name("INTERFACE")
                .help("interface to bridge via EtherTalk")
                .multiple(true)
                .number_of_values(1),
        )
        .arg(
            Arg::with_name("multicast")
                .short("m")
                .long("multicast")
                .value_name("INTERFACE")
                .help("interface to bridge via UDP multicast")
                .multiple(true)
                .number_of_values(1),
        )
        .arg(
            Arg::with_name("serial")
                .short("s")
                .long("serial")
                .value_name("DEVICE")
                .help("TashTalk serial device to bridge via LocalTalk")
                .multiple(true)
                .number_of_values(1),
        )
        .arg(
            Arg::with_name("tcp-client")
                .short("t")
                .long("tcp-client")
                .value_name("HOST:PORT")
                .help("address to dial via TCP")
                .multiple(true)
                .number_of_values(1),
        )
        .arg(
            Arg::with_name("tcp-server")
                .short("T")
                .long("tcp-server")
                .value_name("HOST:PORT")
                .help("address to listen on via TCP")
                .multiple(true)
                .number_of_values(1),
        )
        .arg(
            Arg::with_name("network")
                .short("n")
                .long("network")
                .value_name("UINT16")
                .help("default network number for LocalTalk-side nodes")
                .number_of_values(1),
        )
        .arg(
            Arg::with_name("debug")
                .short("d")
                .long("debug")
                .help("log packets"),
        )
        .arg(
            Arg::with_name("version")
                .short("v")
                .long("version")
                .help("display version and exit"),
        )
        .get_matches();

    if matches.is_present("version") {
        println!("{}", VERSION_STRING);
        return;
    }

    let config = match Config::from_matches(&matches) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err);
            process::exit(1);
        }
    };

    let level = if config.debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    if let Err(err) = supervisor::run(config) {
        eprintln!("{}", err);
        process::exit(1);
    }
}
