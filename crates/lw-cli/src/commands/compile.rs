use std::path::Path;

use miette::{IntoDiagnostic, WrapErr};

pub fn run(file: &Path, output: Option<&Path>, pretty: bool) -> miette::Result<()> {
    let story = super::compile_file(file)?;

    let json = if pretty {
        story.to_json_pretty()
    } else {
        story.to_json()
    }
    .into_diagnostic()?;

    match output {
        Some(path) => {
            std::fs::write(path, json)
                .into_diagnostic()
                .wrap_err_with(|| format!("cannot write {}", path.display()))?;
            eprintln!("  Compiled {} -> {}", file.display(), path.display());
        }
        None => println!("{json}"),
    }

    Ok(())
}
