use vergen::EmitBuilder;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Falls back to placeholder values when git metadata is unavailable.
    EmitBuilder::builder()
        .build_timestamp()
        .git_sha(true)
        .emit()?;
    Ok(())
}
