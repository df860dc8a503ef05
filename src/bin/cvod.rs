#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::env;
use std::path::PathBuf;

use canvas_vod::{AppConfig, CredentialStore, Manager, Operator, auth, manifest};
use console::Term;

/// Interactive prompts on the controlling terminal.
///
/// The captcha image is written to a temp file for the operator to open;
/// rendering it inline is deliberately not attempted.
struct ConsolePrompts {
    term: Term,
}

impl ConsolePrompts {
    fn new() -> Self {
        Self {
            term: Term::stdout(),
        }
    }
}

impl Operator for ConsolePrompts {
    fn username(&mut self, last: Option<&str>) -> std::io::Result<String> {
        match last {
            Some(last) => self
                .term
                .write_str(&format!("Enter username ({last}): "))?,
            None => self.term.write_str("Enter username: ")?,
        }
        self.term.read_line()
    }

    fn password(&mut self) -> std::io::Result<String> {
        self.term.write_str("Enter password: ")?;
        self.term.read_secure_line()
    }

    fn captcha(&mut self, image: &[u8]) -> std::io::Result<String> {
        let path = env::temp_dir().join("canvas-vod-captcha.jpg");
        std::fs::write(&path, image)?;
        self.term
            .write_line(&format!("Captcha image saved to {}", path.display()))?;
        self.term.write_str("Enter captcha: ")?;
        self.term.read_line()
    }
}

fn print_usage() {
    eprintln!("Usage: cvod [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -d, --dir <DIR>     Download directory (default: current directory)");
    eprintln!("  --screen            Also download the screen-capture channel");
    eprintln!("  --full              Ignore the saved snapshot and resync everything");
    eprintln!("  --snapshot <FILE>   Snapshot file path");
    eprintln!("  --cookie <FILE>     Cookie file path");
    eprintln!("  --lang <KEY>        Transcript language key (default: res)");
    eprintln!("  -h, --help          Show this help");
}

fn expect_value<'a>(args: &'a [String], i: usize, flag: &str) -> &'a str {
    args.get(i).map_or_else(
        || {
            eprintln!("Error: {flag} requires a value");
            std::process::exit(1);
        },
        String::as_str,
    )
}

fn main() -> canvas_vod::Result<()> {
    env_logger::init();

    let mut config = AppConfig::new();
    let mut full = false;

    let args: Vec<String> = env::args().skip(1).collect();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-d" | "--dir" => {
                i += 1;
                config.paths.download_dir = PathBuf::from(expect_value(&args, i, "--dir"));
            }
            "--screen" => config.sync.include_screen = true,
            "--full" => full = true,
            "--snapshot" => {
                i += 1;
                config.paths.snapshot_path = PathBuf::from(expect_value(&args, i, "--snapshot"));
            }
            "--cookie" => {
                i += 1;
                config.paths.cookie_path = PathBuf::from(expect_value(&args, i, "--cookie"));
            }
            "--lang" => {
                i += 1;
                config.sync.transcript_lang = expect_value(&args, i, "--lang").to_string();
            }
            "-h" | "--help" => {
                print_usage();
                return Ok(());
            }
            other => {
                eprintln!("Error: unknown option `{other}`");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let store = CredentialStore::new(&config.paths.cookie_path);
    let mut prompts = ConsolePrompts::new();
    let session = auth::authenticate(auth::CLIENT_URL, &store, &mut prompts)?;

    let mut manager = if full {
        Manager::new()
    } else {
        match Manager::load(&config.paths.snapshot_path) {
            Ok(manager) => {
                log::info!(
                    "resuming from snapshot {}",
                    config.paths.snapshot_path.display()
                );
                manager
            }
            Err(_) => Manager::new(),
        }
    };

    manager.authorize(&session)?;
    let failures = manager.refresh();
    if failures > 0 {
        log::warn!("{failures} subject(s) failed to sync");
    }

    if let Err(err) = manager.save(&config.paths.snapshot_path) {
        log::warn!("failed to save snapshot: {err}");
    }

    let selection = manifest::select_all(&manager.subjects);
    manager.download(&selection, &config.paths.download_dir, &config.sync)?;

    println!("Done.");
    Ok(())
}
