//! Entry point for the logwall follower. Parses args, resolves the profile
//! and streams the agent's logs to stdout.

use std::env;
use std::io::{self, Write};

use logwall::cli::parse_args;
use logwall::profiles::{
    load_profiles, save_action, save_profiles, ProfileEntry, ProfileRequest, ResolveProfile,
    SaveAction,
};
use logwall::render::Follower;
use logwall::ws::{connect, follow, with_token};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let parsed = match parse_args(env::args()) {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            return Ok(());
        }
    };

    let profiles_file = load_profiles();
    let req = ProfileRequest {
        profile_name: parsed.profile.clone(),
        url: parsed.url.clone(),
        token: parsed.token.clone(),
    };
    let mut profiles_mut = profiles_file.clone();
    let entry: ProfileEntry = match req.resolve(&profiles_file) {
        ResolveProfile::Direct(entry) => {
            if let Some(name) = parsed.profile.as_ref() {
                let write = match save_action(&profiles_mut, name, &entry) {
                    SaveAction::Create => true,
                    SaveAction::Unchanged => false,
                    SaveAction::Overwrite => {
                        parsed.save
                            || prompt_yes_no(&format!("Overwrite existing profile '{name}'? [y/N]: "))
                    }
                };
                if write {
                    profiles_mut.profiles.insert(name.clone(), entry.clone());
                    if let Err(e) = save_profiles(&profiles_mut) {
                        eprintln!("could not save profile '{name}': {e}");
                    }
                }
            }
            entry
        }
        ResolveProfile::Loaded(entry) => entry,
        ResolveProfile::PromptSelect(names) => {
            eprintln!("Select profile:");
            for (i, n) in names.iter().enumerate() {
                eprintln!("  {}. {}", i + 1, n);
            }
            let line = prompt_string("Enter number (or blank to abort): ")?;
            let picked = line
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|idx| idx.checked_sub(1))
                .and_then(|idx| names.get(idx))
                .and_then(|name| profiles_mut.profiles.get(name));
            match picked {
                Some(entry) => ProfileEntry {
                    url: entry.url.clone(),
                    token: parsed.token.clone().or_else(|| entry.token.clone()),
                },
                None => return Ok(()),
            }
        }
        ResolveProfile::PromptCreate(name) => {
            eprintln!("Profile '{name}' does not exist yet.");
            let url = prompt_string("Enter URL (ws://HOST:PORT/ws): ")?;
            if url.trim().is_empty() {
                return Ok(());
            }
            let token = match parsed.token.clone() {
                Some(t) => Some(t),
                None => {
                    let t = prompt_string("Enter password (or leave blank): ")?;
                    Some(t.trim().to_string()).filter(|t| !t.is_empty())
                }
            };
            let entry = ProfileEntry {
                url: url.trim().to_string(),
                token,
            };
            profiles_mut.profiles.insert(name.clone(), entry.clone());
            if let Err(e) = save_profiles(&profiles_mut) {
                eprintln!("could not save profile '{name}': {e}");
            }
            entry
        }
        ResolveProfile::None => {
            eprintln!("No URL provided and no profiles to select.");
            return Ok(());
        }
    };

    let url = with_token(&entry.url, entry.token.as_deref())?;
    if parsed.dry_run {
        // the password stays off the terminal
        println!("{}", entry.url);
        return Ok(());
    }

    let mut ws = connect(&url).await?;
    let mut follower = Follower::new(parsed.stats);
    let mut stdout = io::stdout();
    let res = tokio::select! {
        res = follow(&mut ws, &mut follower, &mut stdout) => res,
        _ = tokio::signal::ctrl_c() => Ok(()),
    };
    // already closed when the agent hung up
    let _ = ws.close(None).await;
    res
}

fn prompt_yes_no(prompt: &str) -> bool {
    eprint!("{prompt}");
    let _ = io::stderr().flush();
    let mut line = String::new();
    if io::stdin().read_line(&mut line).is_ok() {
        matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    } else {
        false
    }
}

fn prompt_string(prompt: &str) -> io::Result<String> {
    eprint!("{prompt}");
    let _ = io::stderr().flush();
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line)
}
