//! OCpkg CLI — operational driver exercising the writer/reader.
//!
//! Usage:
//!   ocpkg keygen  --output <dir>
//!   ocpkg pack    --output <file> --passphrase <str> --item <path> [--item <path> ...] [--scheme simple|frameshift|fabric]
//!   ocpkg unpack  --input <file> --passphrase <str> --output-dir <dir>
//!   ocpkg inspect --input <file> --passphrase <str>

use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use uuid::Uuid;
use zeroize::Zeroizing;

use crate::config::{
    AuthenticationConfig, CipherConfig, KeyConfirmationConfig, KeyDerivationConfig, MacName,
    ScryptParams, StreamCipherName,
};
use crate::entropy::{EntropySource, OsEntropy};
use crate::reader::{self, Candidates};
use crate::types::{ItemKind, PaddingRange, PayloadConfig, PayloadItem, PayloadScheme};
use crate::um1;
use crate::writer::{ContainerWriter, ManifestCryptoParams, ManifestKeyEstablishment};

type CliResult = Result<(), Box<dyn std::error::Error>>;

pub fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        return ExitCode::from(1);
    }

    let result = match args[1].as_str() {
        "keygen" => cmd_keygen(&args[2..]),
        "pack" => cmd_pack(&args[2..]),
        "unpack" => cmd_unpack(&args[2..]),
        "inspect" => cmd_inspect(&args[2..]),
        "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        "--version" | "-V" => {
            println!("ocpkg {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        cmd => {
            eprintln!("error: unknown command '{}'", cmd);
            print_usage();
            Err("unknown command".into())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    eprintln!(
        r#"OCpkg — secure archival container format

USAGE:
    ocpkg <COMMAND> [OPTIONS]

COMMANDS:
    keygen      Generate a UM1 long-term keypair
    pack        Bundle one or more files into a package
    unpack      Decrypt and extract a package's items
    inspect     Show a package's manifest without extracting items

EXAMPLES:
    ocpkg keygen --output ./keys

    ocpkg pack --output archive.ocpkg --passphrase "correct horse battery staple" \
        --item report.pdf --item notes.txt --scheme frameshift

    ocpkg unpack --input archive.ocpkg --passphrase "correct horse battery staple" \
        --output-dir ./extracted

    ocpkg inspect --input archive.ocpkg --passphrase "correct horse battery staple"

OPTIONS:
    -h, --help       Print help
    -V, --version    Print version
"#
    );
}

fn get_flag(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn get_flag_all(args: &[String], name: &str) -> Vec<String> {
    args.iter()
        .zip(args.iter().skip(1))
        .filter(|(k, _)| *k == name)
        .map(|(_, v)| v.clone())
        .collect()
}

fn require_flag(args: &[String], name: &str) -> Result<String, String> {
    get_flag(args, name).ok_or_else(|| format!("missing required flag: {}", name))
}

fn parse_scheme(name: &str) -> Result<PayloadScheme, String> {
    match name {
        "simple" => Ok(PayloadScheme::Simple),
        "frameshift" => Ok(PayloadScheme::Frameshift { padding: PaddingRange { min: 8, max: 64 } }),
        "fabric" => Ok(PayloadScheme::Fabric { stripe: PaddingRange { min: 64, max: 1024 } }),
        other => Err(format!("unknown scheme '{}' (expected simple, frameshift, or fabric)", other)),
    }
}

fn manifest_crypto(
    passphrase: &[u8],
    entropy: &mut dyn EntropySource,
) -> ManifestCryptoParams {
    ManifestCryptoParams {
        cipher_cfg: CipherConfig::new_stream(StreamCipherName::ChaCha20, entropy.bytes(12)).unwrap(),
        authentication_cfg: AuthenticationConfig::Mac { name: MacName::HmacSha256 },
        kdf_cfg: KeyDerivationConfig::Scrypt {
            salt: entropy.bytes(16),
            params: ScryptParams::default_for(true),
        },
        key_confirmation_cfg: KeyConfirmationConfig::default(),
        key_establishment: ManifestKeyEstablishment::Symmetric {
            pre_key: Zeroizing::new(passphrase.to_vec()),
        },
    }
}

fn item_for_path(path: &Path, entropy: &mut dyn EntropySource) -> Result<PayloadItem, String> {
    let metadata = fs::metadata(path).map_err(|e| format!("stat {}: {}", path.display(), e))?;
    let relative_path = path
        .file_name()
        .ok_or_else(|| format!("{}: has no file name", path.display()))?
        .to_string_lossy()
        .into_owned();

    Ok(PayloadItem {
        identifier: Uuid::new_v4(),
        kind: ItemKind::File,
        relative_path,
        external_length: metadata.len(),
        internal_length: 0,
        cipher_cfg: CipherConfig::new_stream(StreamCipherName::ChaCha20, entropy.bytes(12))
            .map_err(|e| e.to_string())?,
        authentication_cfg: AuthenticationConfig::Mac { name: MacName::HmacSha256 },
        cipher_key: None,
        authentication_key: None,
        kdf_cfg: Some(KeyDerivationConfig::Scrypt {
            salt: entropy.bytes(16),
            params: ScryptParams::default_for(true),
        }),
        key_confirmation_cfg: None,
        key_confirmation_expected_output: None,
        authentication_verified_output: Vec::new(),
    })
}

fn cmd_keygen(args: &[String]) -> CliResult {
    let output_dir = PathBuf::from(get_flag(args, "--output").unwrap_or_else(|| ".".to_string()));
    fs::create_dir_all(&output_dir)?;

    let mut entropy = OsEntropy;
    let (public, secret) = um1::generate_static_keypair(&mut entropy);

    let pub_path = output_dir.join("public.key");
    let sec_path = output_dir.join("secret.key");
    fs::write(&pub_path, public.to_bytes())?;
    fs::write(&sec_path, secret.to_bytes())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&sec_path)?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(&sec_path, perms)?;
    }

    eprintln!("UM1 keypair generated:");
    eprintln!("  public key:  {}", pub_path.display());
    eprintln!("  secret key:  {} (mode 600)", sec_path.display());

    Ok(())
}

fn cmd_pack(args: &[String]) -> CliResult {
    let output = require_flag(args, "--output")?;
    let passphrase = require_flag(args, "--passphrase")?;
    let item_paths = get_flag_all(args, "--item");
    if item_paths.is_empty() {
        return Err("at least one --item is required".into());
    }
    let scheme = parse_scheme(&get_flag(args, "--scheme").unwrap_or_else(|| "simple".to_string()))?;

    let mut entropy = OsEntropy;
    let mut items = Vec::with_capacity(item_paths.len());
    let mut sources: HashMap<Uuid, Box<dyn Read + Send>> = HashMap::new();
    let mut item_pre_keys: HashMap<Uuid, Zeroizing<Vec<u8>>> = HashMap::new();

    for raw_path in &item_paths {
        let path = PathBuf::from(raw_path);
        let item = item_for_path(&path, &mut entropy)?;
        let file = fs::File::open(&path).map_err(|e| format!("open {}: {}", path.display(), e))?;
        sources.insert(item.identifier, Box::new(file));
        item_pre_keys.insert(item.identifier, Zeroizing::new(passphrase.clone().into_bytes()));
        items.push(item);
    }

    let payload_cfg = PayloadConfig { scheme, prng_seed: Vec::new(), offset: 0 };
    let crypto = manifest_crypto(passphrase.as_bytes(), &mut entropy);
    let writer = ContainerWriter::new(items, payload_cfg, crypto, item_pre_keys, sources);

    let mut out_file = fs::File::create(&output)?;
    writer.write(&mut out_file, &mut entropy)?;

    eprintln!("packed {} item(s) -> {}", item_paths.len(), output);
    Ok(())
}

fn cmd_unpack(args: &[String]) -> CliResult {
    let input = require_flag(args, "--input")?;
    let passphrase = require_flag(args, "--passphrase")?;
    let output_dir = PathBuf::from(require_flag(args, "--output-dir")?);

    let mut candidates = Candidates::new();
    candidates.symmetric.push(passphrase.clone().into_bytes());

    let mut in_file = fs::File::open(&input).map_err(|e| format!("open {}: {}", input, e))?;
    let manifest = reader::peek_manifest(&mut in_file, &candidates)?;

    fs::create_dir_all(&output_dir)?;

    let mut sinks: HashMap<Uuid, Box<dyn std::io::Write + Send>> = HashMap::new();
    let mut item_pre_keys: HashMap<Uuid, Zeroizing<Vec<u8>>> = HashMap::new();
    for item in &manifest.payload_items {
        let out_path = output_dir.join(&item.relative_path);
        let file = fs::File::create(&out_path).map_err(|e| format!("create {}: {}", out_path.display(), e))?;
        sinks.insert(item.identifier, Box::new(file));
        item_pre_keys.insert(item.identifier, Zeroizing::new(passphrase.clone().into_bytes()));
    }

    let manifest = reader::read(&mut in_file, &candidates, &item_pre_keys, sinks)?;
    eprintln!("unpacked {} item(s) -> {}", manifest.payload_items.len(), output_dir.display());
    Ok(())
}

fn cmd_inspect(args: &[String]) -> CliResult {
    let input = require_flag(args, "--input")?;
    let passphrase = require_flag(args, "--passphrase")?;

    let mut candidates = Candidates::new();
    candidates.symmetric.push(passphrase.into_bytes());

    let mut in_file = fs::File::open(&input).map_err(|e| format!("open {}: {}", input, e))?;
    let manifest = reader::peek_manifest(&mut in_file, &candidates)?;

    println!("OCpkg container: {}", input);
    println!("================");
    println!("items:     {}", manifest.payload_items.len());
    println!("scheme:    {:?}", manifest.payload_cfg.scheme);
    println!("offset:    {} bytes", manifest.payload_cfg.offset);
    println!();
    for item in &manifest.payload_items {
        println!(
            "  {}  {:>10} bytes (external)  {:?}",
            item.relative_path, item.external_length, item.kind
        );
    }

    Ok(())
}
