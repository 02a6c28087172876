use std::path::Path;

pub fn run(file: &Path) -> miette::Result<()> {
    let story = super::compile_file(file)?;

    let choices: usize = story.choice_groups.iter().map(|g| g.choices.len()).sum();
    println!("  All checks passed for '{}'.", file.display());
    println!(
        "  {} knots and stitches, {} choices, {} variables",
        story.paths.len(),
        choices,
        story.variables.len()
    );

    Ok(())
}
