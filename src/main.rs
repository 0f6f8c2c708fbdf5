use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::error;
use tracing_subscriber::EnvFilter;

use artseal::{
    claim::{ClaimRequest, ClaimResponse, ClaimVerifier, CompactJwsVerifier, MAX_REQUEST_BYTES},
    error::{EXIT_CRYPTO, EXIT_IO, EXIT_MISMATCH, EXIT_OK},
    fs_guard,
    hasher::digest_file,
    keys::{KeySource, PUBLIC_KEY_ENV, SEED_ENV},
    manifest::{path_within, Manifest, ManifestBuilder, ManifestVerifier},
    signing::{self, DetachedSignature, KeyPair},
    SealConfig, SealError, Sha256Hasher,
};

/// Largest artifact `sign`/`verify-signature` will read (500 MB).
const MAX_ARTIFACT_BYTES: u64 = 500 * 1024 * 1024;
/// Signature files hold 88 base64 chars; allow generous whitespace.
const MAX_SIGNATURE_FILE_BYTES: u64 = 4 * 1024;

#[derive(Parser)]
#[command(
    name = "artseal",
    about = "Deployment manifests, detached signatures and approval claims",
    version
)]
struct Cli {
    /// Configuration JSON (identity, license, symlink policy, exclusions)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Hash every file under a directory and write a manifest
    BuildManifest {
        root_dir: PathBuf,
        out_path: PathBuf,
    },

    /// Check a directory against a manifest
    VerifyManifest {
        manifest_path: PathBuf,
        root_dir: PathBuf,

        /// Write the verification report as JSON
        #[arg(long)]
        report: Option<PathBuf>,

        /// Do not compare subject/workflow fields against the configuration
        #[arg(long)]
        no_identity_check: bool,
    },

    /// Write a base64 detached signature over a file's exact bytes
    Sign {
        /// `env:NAME` or a file holding the base64 32-byte seed
        seed_source: KeySource,
        input_file: PathBuf,
        out_sig_file: PathBuf,
    },

    /// Check a detached signature
    VerifySignature {
        /// `env:NAME` or a file holding the base64 public key (or a JWK)
        public_key_source: KeySource,
        input_file: PathBuf,
        sig_file: PathBuf,
    },

    /// Print the base64 public key for a seed
    PublicKey {
        /// Defaults to `env:CFBK_SIGNING_SEED_BASE64`
        seed_source: Option<KeySource>,
    },

    /// Print the SHA-256 of a file
    Hash { file: PathBuf },

    /// Verify an approval claim request `{header, token, jws?}`
    VerifyClaim {
        request_file: PathBuf,

        /// Key for the signed envelope (`env:NAME` or file; base64 or JWK).
        /// Falls back to `CFBK_PUBLIC_KEY_BASE64` when that variable is set.
        #[arg(long)]
        public_key: Option<KeySource>,
    },
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{e:#}");
            eprintln!("❌ artseal: {e:#}");
            std::process::exit(exit_code_for(&e));
        }
    }
}

/// Recovers the exit class from the first [`SealError`] in the chain.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|e| e.downcast_ref::<SealError>())
        .map_or(EXIT_IO, SealError::exit_code)
}

fn run(cli: Cli) -> Result<i32> {
    let config = SealConfig::load(cli.config.as_deref()).context("loading configuration")?;
    match cli.cmd {
        Cmd::BuildManifest { root_dir, out_path } => build_manifest(&config, &root_dir, &out_path),
        Cmd::VerifyManifest {
            manifest_path,
            root_dir,
            report,
            no_identity_check,
        } => verify_manifest(
            &config,
            &manifest_path,
            &root_dir,
            report.as_deref(),
            no_identity_check,
        ),
        Cmd::Sign {
            seed_source,
            input_file,
            out_sig_file,
        } => sign_file(&seed_source, &input_file, &out_sig_file),
        Cmd::VerifySignature {
            public_key_source,
            input_file,
            sig_file,
        } => verify_signature(&public_key_source, &input_file, &sig_file),
        Cmd::PublicKey { seed_source } => {
            let seed_source = seed_source.unwrap_or_else(|| KeySource::Env(SEED_ENV.into()));
            let seed = seed_source.load_seed()?;
            println!("{}", KeyPair::from_seed(&seed)?.public_key_base64());
            Ok(EXIT_OK)
        }
        Cmd::Hash { file } => {
            let (digest, size) = digest_file(&Sha256Hasher, &file)?;
            println!("{digest}  {} ({size} bytes)", file.display());
            Ok(EXIT_OK)
        }
        Cmd::VerifyClaim {
            request_file,
            public_key,
        } => verify_claim(&config, &request_file, public_key.as_ref()),
    }
}

fn build_manifest(config: &SealConfig, root: &Path, out: &Path) -> Result<i32> {
    println!("🔒 Building manifest for {}", root.display());

    let mut builder = ManifestBuilder::new(config);
    if let Some(rel) = path_within(root, out) {
        builder = builder.exclude(rel);
    }
    let manifest = builder.build(root)?;
    manifest.write(out)?;

    println!("✅ Manifest written: {}", out.display());
    println!("   Files: {}", manifest.file_count());
    println!("   Size: {} bytes", manifest.total_size());
    println!("   Manifest digest: {}", manifest.manifest_digest);
    Ok(EXIT_OK)
}

fn verify_manifest(
    config: &SealConfig,
    manifest_path: &Path,
    root: &Path,
    report_path: Option<&Path>,
    no_identity_check: bool,
) -> Result<i32> {
    let manifest = Manifest::load(manifest_path)
        .with_context(|| format!("loading manifest {}", manifest_path.display()))?;

    let mut verifier = ManifestVerifier::new(config);
    if no_identity_check {
        verifier = verifier.skip_identity_check();
    }
    if let Some(rel) = path_within(root, manifest_path) {
        verifier = verifier.exclude(rel);
    }
    let report = verifier.verify(&manifest, root)?;
    if !no_identity_check {
        println!("✅ Subject and workflow binding verified");
    }
    println!("✅ Manifest digest verified: {}", manifest.manifest_digest);

    for p in &report.mismatched {
        println!("❌ Hash mismatch: {p}");
    }
    for p in &report.missing {
        println!("❌ File not found: {p}");
    }
    for p in &report.extra {
        println!("⚠️  Untracked file: {p}");
    }

    if let Some(out) = report_path {
        let body = serde_json::json!({
            "manifest": manifest_path.display().to_string(),
            "root": root.display().to_string(),
            "manifest_digest": manifest.manifest_digest,
            "result": if report.is_success() { "PASS" } else { "FAIL" },
            "report": report,
        });
        fs::write(out, serde_json::to_vec_pretty(&body)?)
            .with_context(|| format!("writing report {}", out.display()))?;
    }

    if report.is_success() {
        println!("✅ Verified {} file hashes", report.matched);
        Ok(EXIT_OK)
    } else {
        println!(
            "❌ Verification failed: {} mismatched, {} missing, {} matched",
            report.mismatched.len(),
            report.missing.len(),
            report.matched
        );
        Ok(EXIT_MISMATCH)
    }
}

fn sign_file(seed_source: &KeySource, input: &Path, out: &Path) -> Result<i32> {
    let seed = seed_source.load_seed()?;
    let keypair = KeyPair::from_seed(&seed)?;
    let message = fs_guard::read_validated(input, MAX_ARTIFACT_BYTES)?;
    let sig = keypair.sign(&message);
    fs::write(out, sig.to_base64()).with_context(|| format!("writing {}", out.display()))?;

    println!("✅ Wrote signature (base64) to {}", out.display());
    println!("   Public key (base64): {}", keypair.public_key_base64());
    Ok(EXIT_OK)
}

fn verify_signature(key_source: &KeySource, input: &Path, sig_file: &Path) -> Result<i32> {
    let public_key = key_source.load_public_key()?;
    let message = fs_guard::read_validated(input, MAX_ARTIFACT_BYTES)?;
    let sig_text = fs_guard::read_validated_string(sig_file, MAX_SIGNATURE_FILE_BYTES)?;
    let sig = DetachedSignature::from_base64(&sig_text)?;

    if signing::verify(&public_key, &message, sig.as_bytes())? {
        println!("✅ Signature valid: {}", input.display());
        Ok(EXIT_OK)
    } else {
        println!("❌ Signature invalid: {}", input.display());
        Ok(EXIT_CRYPTO)
    }
}

fn verify_claim(
    config: &SealConfig,
    request_file: &Path,
    public_key: Option<&KeySource>,
) -> Result<i32> {
    let bytes = fs_guard::read_validated(request_file, MAX_REQUEST_BYTES)?;
    let key_source = public_key.cloned().or_else(|| {
        std::env::var_os(PUBLIC_KEY_ENV).map(|_| KeySource::Env(PUBLIC_KEY_ENV.into()))
    });

    // The key is only loaded for requests that carry an envelope.
    let outcome = ClaimRequest::from_json_slice(&bytes).and_then(|req| {
        let mut verifier = ClaimVerifier::new(config)?;
        if let (Some(_), Some(src)) = (req.envelope(), key_source) {
            verifier =
                verifier.with_envelope_verifier(CompactJwsVerifier::new(src.load_public_key()?));
        }
        verifier.verify(&req)
    });
    let response = ClaimResponse::from_outcome(&outcome);
    println!("{}", serde_json::to_string(&response)?);

    match outcome {
        Ok(status) => {
            if response.verified {
                eprintln!("✅ Claim cryptographically verified");
            } else {
                eprintln!("⚠️  Claim structurally valid only ({status:?}); no signed envelope");
            }
            Ok(EXIT_OK)
        }
        Err(e) => {
            eprintln!("❌ Claim rejected: {e}");
            Ok(e.exit_code())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use artseal::error::EXIT_MALFORMED;

    #[test]
    fn exit_code_follows_seal_error_in_chain() {
        let err = anyhow::Error::new(SealError::InvalidSeedLength(3)).context("loading seed");
        assert_eq!(exit_code_for(&err), EXIT_MALFORMED);
    }

    #[test]
    fn exit_code_defaults_to_io() {
        assert_eq!(exit_code_for(&anyhow::anyhow!("boom")), EXIT_IO);
    }

    #[test]
    fn cli_parses_key_sources() {
        let cli = Cli::try_parse_from(["artseal", "sign", "env:SEED", "in.json", "in.sig"]).unwrap();
        match cli.cmd {
            Cmd::Sign { seed_source, .. } => {
                assert_eq!(seed_source, KeySource::Env("SEED".into()));
            }
            _ => panic!("expected sign"),
        }
    }
}
