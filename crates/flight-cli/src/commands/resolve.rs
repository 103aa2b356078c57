//! `flight resolve` command implementation.

use flight_core::pkg::{
    read_package_deps, PackageSpec, PkgError, ResolutionError, Resolver, Warnings,
};
use flight_core::Config;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

/// Resolve result for JSON output.
#[derive(Serialize)]
struct ResolveResult<'a> {
    ok: bool,
    lockfile: String,
    resolved: usize,
    fetched: usize,
    warnings: &'a Warnings,
}

/// Rejected resolution for JSON output. `error` carries `{kind, data}`.
#[derive(Serialize)]
struct ResolveRejected<'a> {
    ok: bool,
    error: &'a ResolutionError,
}

/// Bad input for JSON output.
#[derive(Serialize)]
struct UsageError<'a> {
    ok: bool,
    error: ErrorInfo<'a>,
}

#[derive(Serialize)]
struct ErrorInfo<'a> {
    code: &'a str,
    message: &'a str,
}

pub fn run(config: &Config, specs: &[String], include_dev: bool, json: bool) -> Result<()> {
    info!(cwd = %config.cwd.display(), "RESOLVE command invoked");

    let roots = collect_roots(config, specs, include_dev).unwrap_or_else(|e| usage_error(&e, json));
    let client = config
        .registry_client()
        .unwrap_or_else(|e| usage_error(&e, json));
    info!(registry = %client.base_url(), roots = roots.len(), "resolving");

    let resolver = Resolver::new(client, config.resolver.clone());
    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    let outcome = match runtime.block_on(resolver.resolve(&roots)) {
        Ok(outcome) => outcome,
        Err(e) => {
            if json {
                let result = ResolveRejected {
                    ok: false,
                    error: &e,
                };
                println!("{}", serde_json::to_string_pretty(&result).into_diagnostic()?);
            } else {
                eprintln!("error: {}: {e}", e.code());
                if let ResolutionError::MissingPeers(missing) = &e {
                    for (peer, consumers) in missing {
                        for (consumer, range) in consumers {
                            eprintln!("  {consumer} requires peer {peer}@{range}");
                        }
                    }
                }
            }
            std::process::exit(1);
        }
    };

    let path = config.lockfile_path();
    outcome
        .lockfile
        .write_to(&path)
        .map_err(|e| miette::miette!("{e}"))?;
    info!(path = %path.display(), "Lockfile successfully created.");

    if json {
        let result = ResolveResult {
            ok: true,
            lockfile: path.display().to_string(),
            resolved: outcome.resolved_count,
            fetched: outcome.fetched_count,
            warnings: &outcome.lockfile.warnings,
        };
        println!("{}", serde_json::to_string_pretty(&result).into_diagnostic()?);
    } else {
        for (consumer, peers) in &outcome.lockfile.warnings.invalid_peers {
            for (peer, range) in peers {
                eprintln!("! {consumer} requires peer {peer}@{range}, which is not satisfied");
            }
        }
        println!(
            "Resolved {} packages ({} fetched) -> {}",
            outcome.resolved_count,
            outcome.fetched_count,
            path.display()
        );
    }

    Ok(())
}

/// Root specifiers from the command line, or from package.json when none are given.
fn collect_roots(
    config: &Config,
    specs: &[String],
    include_dev: bool,
) -> Result<BTreeMap<String, String>, PkgError> {
    if specs.is_empty() {
        return Ok(read_package_deps(&config.package_json_path(), include_dev)?.deps);
    }

    specs
        .iter()
        .map(|raw| {
            let spec = PackageSpec::parse(raw)?;
            let range = spec.range_or_wildcard().to_string();
            Ok((spec.name, range))
        })
        .collect()
}

/// Report bad input and exit with code 2.
fn usage_error(e: &PkgError, json: bool) -> ! {
    if json {
        let result = UsageError {
            ok: false,
            error: ErrorInfo {
                code: e.code(),
                message: e.message(),
            },
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&result).unwrap_or_default()
        );
    } else {
        eprintln!("error: {e}");
    }
    std::process::exit(2);
}
