use std::error::Error;

use vergen::{Build, Emitter, Rustc};
use vergen_git2::Git2;

fn main() -> Result<(), Box<dyn Error>> {
    let build = Build::all_build();
    let rustc = Rustc::all_rustc();
    let git = Git2::all_git();

    // Missing git metadata (tarball builds) degrades to defaults instead
    // of failing the build.
    Emitter::default()
        .add_instructions(&build)?
        .add_instructions(&rustc)?
        .add_instructions(&git)?
        .emit()?;

    Ok(())
}
