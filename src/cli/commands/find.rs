//! Find command - look up a package's compiled record

use crate::cli::args::FindArgs;
use crate::config::Config;
use crate::error::{RelprovError, RelprovResult};
use crate::release::ReleaseManifest;
use console::style;

/// Execute the find command
pub async fn execute(args: FindArgs, config: &Config) -> RelprovResult<()> {
    let release = ReleaseManifest::load_release(&args.manifest).await?;

    let pkg = release
        .find_by_name(&args.package)
        .or_else(|| {
            release
                .compiled_packages()
                .iter()
                .find(|p| p.name == args.package)
        })
        .ok_or_else(|| RelprovError::ReleaseManifestInvalid {
            path: args.manifest.clone(),
            reason: format!("no package named {}", args.package),
        })?;

    let record = super::compiler_factory(config, 1)
        .find_compiled_package(pkg)
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        println!("{}", style(pkg).bold());
        println!("  blob_id:     {}", record.blob_id);
        println!("  fingerprint: {}", record.fingerprint);
    }

    Ok(())
}
