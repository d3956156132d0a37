use std::{convert::TryFrom, sync::Arc};

use anyhow::{anyhow, bail, Context};
use clap::{Arg, ArgMatches, Command};
use logger::LevelFilter;
use mem::Addr;
use platform::LinuxHost;

use crate::{
    capabilities::warn_if_unprivileged, client::Client, config::BridgeConfig,
    dispatcher::Dispatcher, endpoint::Endpoint,
};

pub fn cli_main() -> anyhow::Result<()> {
    let pid_arg = Arg::new("pid")
        .required(true)
        .takes_value(true)
        .long("pid")
        .short('p')
        .help("Process on the other side of the copy");

    let addr_arg = Arg::new("addr")
        .required(true)
        .takes_value(true)
        .long("addr")
        .short('a')
        .help("Address in that process, decimal or 0x-prefixed");

    let matches = Command::new("membridge")
        .arg(Arg::new("v").multiple_occurrences(true).short('v'))
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .takes_value(true)
                .help("JSON configuration file"),
        )
        .subcommand(Command::new("serve").about("Serve copy requests on the socket"))
        .subcommand(
            Command::new("read")
                .about("Dump memory of another process")
                .arg(&pid_arg)
                .arg(&addr_arg)
                .arg(
                    Arg::new("len")
                        .required(true)
                        .takes_value(true)
                        .long("len")
                        .short('n'),
                ),
        )
        .subcommand(
            Command::new("write")
                .about("Store hex-encoded bytes into another process")
                .arg(&pid_arg)
                .arg(&addr_arg)
                .arg(Arg::new("hex").required(true).takes_value(true).long("hex")),
        )
        .get_matches();

    let config = match matches.value_of("config") {
        Some(path) => BridgeConfig::load(path)?,
        None => BridgeConfig::default(),
    };
    let level = config
        .log_level()
        .max(verbosity_level(matches.occurrences_of("v")));
    logger::init(level).map_err(|_| anyhow!("failed to set log level"))?;

    match matches.subcommand() {
        Some(("serve", _)) => serve(&config),
        Some(("read", read)) => read_memory(read, &config),
        Some(("write", write)) => write_memory(write, &config),
        e => bail!("unknown subcommand for membridge {:?}", e),
    }
}

fn serve(config: &BridgeConfig) -> anyhow::Result<()> {
    warn_if_unprivileged();
    let endpoint = Endpoint::register(&config.socket_path, config.socket_mode, config.max_frame)
        .context("failed to register endpoint")?;
    let dispatcher = Arc::new(Dispatcher::new(LinuxHost::new(config.chunk_size)));
    endpoint.serve(dispatcher)
}

fn read_memory(matches: &ArgMatches, config: &BridgeConfig) -> anyhow::Result<()> {
    let pid = parse_number(matches.value_of("pid").context("missing --pid")?)?;
    let addr = parse_number(matches.value_of("addr").context("missing --addr")?)?;
    let len = parse_number(matches.value_of("len").context("missing --len")?)?;
    let pid = u32::try_from(pid).context("pid out of range")?;
    let len = usize::try_from(len).context("length out of range")?;

    let mut buf = vec![0u8; len];
    let completion = Client::connect(&config.socket_path)?.read(pid, Addr(addr), &mut buf)?;
    if !completion.status.is_success() {
        bail!("read of {} bytes at {:#x} failed: {}", len, addr, completion.status);
    }
    for line in hexdump(Addr(addr), &buf) {
        println!("{}", line);
    }
    Ok(())
}

fn write_memory(matches: &ArgMatches, config: &BridgeConfig) -> anyhow::Result<()> {
    let pid = parse_number(matches.value_of("pid").context("missing --pid")?)?;
    let addr = parse_number(matches.value_of("addr").context("missing --addr")?)?;
    let pid = u32::try_from(pid).context("pid out of range")?;
    let bytes = hex::decode(matches.value_of("hex").context("missing --hex")?)
        .context("--hex is not valid hex")?;
    if bytes.is_empty() {
        bail!("nothing to write");
    }

    let completion = Client::connect(&config.socket_path)?.write(pid, Addr(addr), &bytes)?;
    if !completion.status.is_success() {
        bail!(
            "write of {} bytes at {:#x} failed: {}",
            bytes.len(),
            addr,
            completion.status
        );
    }
    Ok(())
}

fn verbosity_level(occurrences: u64) -> LevelFilter {
    match occurrences {
        0 => LevelFilter::Off,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn parse_number(s: &str) -> anyhow::Result<u64> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.with_context(|| format!("invalid number {:?}", s))
}

fn hexdump(base: Addr, bytes: &[u8]) -> Vec<String> {
    bytes
        .chunks(16)
        .enumerate()
        .map(|(i, chunk)| {
            let addr = base.0.wrapping_add(i as u64 * 16);
            format!("{:016x}  {}", addr, hex::encode(chunk))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_in_both_radixes() {
        assert_eq!(parse_number("4096").unwrap(), 4096);
        assert_eq!(parse_number("0x1000").unwrap(), 0x1000);
        assert_eq!(parse_number("0XfF").unwrap(), 0xff);
        assert!(parse_number("0x").is_err());
        assert!(parse_number("12ab").is_err());
    }

    #[test]
    fn verbosity_raises_level() {
        assert_eq!(verbosity_level(0), LevelFilter::Off);
        assert_eq!(verbosity_level(2), LevelFilter::Debug);
        assert_eq!(verbosity_level(9), LevelFilter::Trace);
    }

    #[test]
    fn hexdump_lines() {
        let bytes: Vec<u8> = (0..20).collect();
        let lines = hexdump(Addr(0x7000), &bytes);
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "0000000000007000  000102030405060708090a0b0c0d0e0f"
        );
        assert_eq!(lines[1], "0000000000007010  10111213");
    }
}
