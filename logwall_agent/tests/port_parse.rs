//! Command-line parsing for the agent binary.

use logwall_agent::CliArgs;

fn parse(args: &[&str]) -> Result<CliArgs, String> {
    CliArgs::parse(std::iter::once("agent").chain(args.iter().copied()).map(String::from))
}

#[test]
fn port_long_short_and_assign() {
    assert_eq!(parse(&["--port", "9001"]).unwrap().port, Some(9001));
    assert_eq!(parse(&["-p", "9002"]).unwrap().port, Some(9002));
    assert_eq!(parse(&["--port=9003"]).unwrap().port, Some(9003));
    assert_eq!(parse(&[]).unwrap().port, None);
}

#[test]
fn bad_port_is_rejected() {
    assert!(parse(&["--port", "http"]).is_err());
    assert!(parse(&["-p"]).is_err());
    assert!(parse(&["--port=70000"]).is_err());
}

#[test]
fn config_and_log_dir() {
    let a = parse(&["-c", "/etc/logwall.conf", "--log-dir", "/var/log/ww"]).unwrap();
    assert_eq!(a.config.as_deref(), Some(std::path::Path::new("/etc/logwall.conf")));
    assert_eq!(a.log_dir.as_deref(), Some(std::path::Path::new("/var/log/ww")));

    let b = parse(&["--config=x.conf", "-d", "logs"]).unwrap();
    assert_eq!(b.config.as_deref(), Some(std::path::Path::new("x.conf")));
    assert_eq!(b.log_dir.as_deref(), Some(std::path::Path::new("logs")));
}

#[test]
fn unknown_flag_is_an_error() {
    let err = parse(&["--enableSSL"]).unwrap_err();
    assert!(err.contains("--enableSSL"));
    assert!(err.contains("Usage:"));
}
