use anyhow::{bail, Context, Result};
use attest_core::keystore::{KeyLocation, KeySource, KeyStore};
use attest_core::paths::default_keys_dir;
use attest_core::settings::Settings;
use attest_core::{signer, text, vault, verifier, AttestError, LogRequestDecoder};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod prompt;

const LOG_ENV: &str = "ATTEST_LOG";

#[derive(Parser, Debug)]
#[command(name = "attest", version, about = "Sign and verify log checkpoint requests", long_about = None)]
struct Cli {
    /// Keys directory (default: $ATTEST_KEYS_DIR, else ~/.attest)
    #[arg(long, global = true)]
    keys_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a new password-protected key pair
    Generate {
        /// Key name inside the keys directory
        #[arg(long)]
        name: Option<String>,
    },

    /// Sign a request (base64url, or - to read stdin)
    Sign {
        request: String,

        /// Key name or path to a key file
        #[arg(short = 'i', long = "id")]
        id: Option<String>,

        /// Sign without asking for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Verify a response against the request it answers
    Verify {
        response: String,
        request: String,

        /// Public key, key file or directory of keys
        public_key: Option<String>,

        /// Key name or path to a key file
        #[arg(short = 'i', long = "id", conflicts_with = "public_key")]
        id: Option<String>,
    },

    /// Change the password protecting a key
    Passwd {
        #[arg(short = 'i', long = "id")]
        id: Option<String>,
    },

    /// Print a public key
    Show {
        #[arg(short = 'i', long = "id")]
        id: Option<String>,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let keys_dir = match cli.keys_dir {
        Some(dir) => dir,
        None => default_keys_dir()?,
    };
    let settings = Settings::load(&keys_dir)
        .with_context(|| format!("loading settings from {}", keys_dir.display()))?;
    debug!(keys_dir = %keys_dir.display(), ?settings, "starting");

    match cli.command {
        Commands::Generate { name } => generate_command(&keys_dir, &settings, name),
        Commands::Sign { request, id, yes } => {
            sign_command(&keys_dir, &settings, &request, id.as_deref(), yes)
        }
        Commands::Verify {
            response,
            request,
            public_key,
            id,
        } => verify_command(
            &keys_dir,
            &settings,
            &response,
            &request,
            public_key.as_deref(),
            id.as_deref(),
        ),
        Commands::Passwd { id } => passwd_command(&keys_dir, &settings, id.as_deref()),
        Commands::Show { id } => show_command(&keys_dir, &settings, id.as_deref()),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// base64url text from an argument, or from stdin when the argument is `-`.
fn read_encoded(arg: &str) -> Result<Vec<u8>> {
    if arg == "-" {
        let mut input = String::new();
        std::io::stdin().read_to_string(&mut input)?;
        return Ok(text::decode(&input)?);
    }
    Ok(text::decode(arg)?)
}

fn locate(keys_dir: &Path, settings: &Settings, id: Option<&str>) -> Result<KeyLocation> {
    Ok(KeyLocation::parse(id, keys_dir, &settings.default_key)?)
}

fn generate_command(keys_dir: &Path, settings: &Settings, name: Option<String>) -> Result<()> {
    let name = name.unwrap_or_else(|| settings.default_key.clone());
    let store = KeyStore::new(keys_dir);
    for path in [store.secret_key_path(&name), store.public_key_path(&name)] {
        if path.exists() {
            return Err(AttestError::KeyExists(path).into());
        }
    }
    let params = settings.kdf.params()?;
    let password = prompt::new_password("New key password: ", prompt::PASSWORD_ENV)?;
    eprintln!("Generating key pair...");
    let generated = vault::generate(password, params)?;
    let path = store.create(&name, &generated)?;
    eprintln!("Key pair written to {}", path.display());
    println!("{}", generated.public_key);
    Ok(())
}

fn sign_command(
    keys_dir: &Path,
    settings: &Settings,
    request: &str,
    id: Option<&str>,
    yes: bool,
) -> Result<()> {
    let location = locate(keys_dir, settings, id)?;
    let store = location.store();
    let raw_request = read_encoded(request).context("could not decode the signing request")?;
    let public_key = store.load_public(&location.name)?;
    let blob = store.load_secret(&location.name)?;

    let prepared = signer::prepare(&LogRequestDecoder, &raw_request, &public_key)?;
    eprintln!("{}\n", prepared.request());
    if !yes && !prompt::confirm("Confirm? [y/N] ")? {
        bail!("request rejected");
    }

    let password = prompt::password("Key password: ")?;
    let response = prepared.sign(&blob, password)?;
    eprintln!("Signed with public key {public_key}");
    println!("{}", text::encode(response));
    Ok(())
}

fn verify_command(
    keys_dir: &Path,
    settings: &Settings,
    response: &str,
    request: &str,
    public_key: Option<&str>,
    id: Option<&str>,
) -> Result<()> {
    let raw_response = read_encoded(response).context("could not decode the response")?;
    let raw_request = read_encoded(request).context("could not decode the signing request")?;

    let source = match (public_key, id) {
        (Some(key), _) => KeySource::parse(key)?,
        (None, Some(_)) => {
            let location = locate(keys_dir, settings, id)?;
            KeySource::File(location.store().public_key_path(&location.name))
        }
        (None, None) => KeySource::Directory(keys_dir.to_path_buf()),
    };
    let claimed = verifier::claimed_public_key(&raw_response)?;
    let key = source.resolve_for(&claimed)?;
    let verified = verifier::verify(&LogRequestDecoder, &raw_response, &raw_request, &key)?;

    eprintln!("The signature is valid.");
    println!("{key}");
    println!("{verified}");
    Ok(())
}

fn passwd_command(keys_dir: &Path, settings: &Settings, id: Option<&str>) -> Result<()> {
    let location = locate(keys_dir, settings, id)?;
    let store = location.store();
    let blob = store.load_secret(&location.name)?;
    let params = settings.kdf.params()?;

    let old = prompt::password("Current password: ")?;
    let new = prompt::new_password("New password: ", prompt::NEW_PASSWORD_ENV)?;
    let rekeyed = vault::rekey(&blob, old, new, params)?;
    store.replace_secret(&location.name, &rekeyed)?;
    eprintln!("Password changed for {}", store.secret_key_path(&location.name).display());
    Ok(())
}

fn show_command(keys_dir: &Path, settings: &Settings, id: Option<&str>) -> Result<()> {
    let location = locate(keys_dir, settings, id)?;
    println!("{}", location.store().load_public(&location.name)?);
    Ok(())
}
