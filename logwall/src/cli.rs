//! Command-line parsing for the follower.

#[derive(Debug, Default, PartialEq)]
pub struct ParsedArgs {
    pub url: Option<String>,
    pub token: Option<String>,
    pub profile: Option<String>,
    pub save: bool,
    pub stats: bool,
    pub dry_run: bool,
}

pub fn usage(prog: &str) -> String {
    format!(
        "Usage: {prog} [--profile NAME|-P NAME] [--token PW|-k PW] [--stats] [--save] [--dry-run] [ws://HOST:PORT/ws]"
    )
}

/// `Err` carries the text to print: usage for `--help`, or the problem.
pub fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<ParsedArgs, String> {
    let mut it = args.into_iter();
    let prog = it.next().unwrap_or_else(|| "logwall".into());
    let mut out = ParsedArgs::default();

    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-h" | "--help" => return Err(usage(&prog)),
            "--token" | "-k" => out.token = it.next(),
            "--profile" | "-P" => out.profile = it.next(),
            "--save" => out.save = true,
            "--stats" => out.stats = true,
            "--dry-run" => out.dry_run = true,
            _ if arg.starts_with("--token=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    if !v.is_empty() {
                        out.token = Some(v.to_string());
                    }
                }
            }
            _ if arg.starts_with("--profile=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    if !v.is_empty() {
                        out.profile = Some(v.to_string());
                    }
                }
            }
            _ if arg.starts_with('-') => {
                return Err(format!("Unknown option '{arg}'. {}", usage(&prog)));
            }
            _ => {
                if out.url.is_none() {
                    out.url = Some(arg);
                } else {
                    return Err(format!("Unexpected argument. {}", usage(&prog)));
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<ParsedArgs, String> {
        parse_args(std::iter::once("logwall").chain(args.iter().copied()).map(String::from))
    }

    #[test]
    fn flags_long_short_and_assign() {
        let a = parse(&["-P", "prod", "-k", "pw", "--stats", "ws://h/ws"]).unwrap();
        assert_eq!(a.profile.as_deref(), Some("prod"));
        assert_eq!(a.token.as_deref(), Some("pw"));
        assert!(a.stats && !a.save);
        assert_eq!(a.url.as_deref(), Some("ws://h/ws"));

        let b = parse(&["--profile=dev", "--token=x", "--save", "--dry-run"]).unwrap();
        assert_eq!(b.profile.as_deref(), Some("dev"));
        assert_eq!(b.token.as_deref(), Some("x"));
        assert!(b.save && b.dry_run);
    }

    #[test]
    fn help_and_errors() {
        assert!(parse(&["--help"]).unwrap_err().starts_with("Usage: logwall"));
        assert!(parse(&["ws://a/ws", "ws://b/ws"]).unwrap_err().contains("Unexpected"));
        assert!(parse(&["--tls-ca", "x"]).unwrap_err().contains("--tls-ca"));
    }
}
