//! Check command implementation.

use anyhow::Result;

use super::Inputs;
use crate::diagnostics::TracingSink;
use crate::fs_abstraction::real_fs;
use crate::parser::parse;
use crate::verify::Verifier;

/// Verify generated files against the configuration
pub async fn run(inputs: &Inputs) -> Result<()> {
    let settings = inputs.load_settings()?;
    let tree = parse(&inputs.read_config()?)?;

    if tree.disabled {
        println!("[OK] Blacklist disabled, nothing to check");
        return Ok(());
    }

    let verifier = Verifier::new(&tree, &settings, real_fs(), &TracingSink);
    if verifier.verify_all() {
        println!("[OK] Generated files match the configuration");
        Ok(())
    } else {
        anyhow::bail!("Generated files do not match the configuration")
    }
}
