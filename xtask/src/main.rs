// peg-insight - Build Task Runner
// Unified build system using cargo xtask pattern

use anyhow::{Context, Result};
use xshell::{cmd, Shell};

fn main() -> Result<()> {
    let sh = Shell::new()?;
    let args: Vec<_> = std::env::args().skip(1).collect();

    match args.first().map(|s| s.as_str()) {
        Some("build") => {
            let release = args.contains(&"--release".to_string());
            build(&sh, release)
        }
        Some("test") => test(&sh),
        Some("format") => {
            let check = args.contains(&"--check".to_string());
            format(&sh, check)
        }
        Some("clippy") => clippy(&sh),
        Some("run") => run(&sh, &args[1..]),
        Some("clean") => clean(&sh),
        Some("coverage") => coverage(&sh),
        Some("ci") => ci(&sh),
        Some("install") => {
            if args.len() < 2 {
                eprintln!("Error: install requires a destination path");
                eprintln!("Usage: cargo xtask install <destination>");
                std::process::exit(1);
            }
            install(&sh, &args[1])
        }
        _ => {
            print_help();
            Ok(())
        }
    }
}

fn print_help() {
    println!("peg-insight - Build Commands:");
    println!();
    println!("Usage: cargo xtask <COMMAND> [OPTIONS]");
    println!();
    println!("Commands:");
    println!("  build [--release]   Build the backend");
    println!("  test                Run all tests");
    println!("  format [--check]    Format code (check mode doesn't modify)");
    println!("  clippy              Run clippy checks");
    println!("  run [ARGS...]       Build and run the application");
    println!("  clean               Clean build artifacts");
    println!("  coverage            Generate test coverage report");
    println!("  ci                  Run all CI checks (format + clippy + build + test)");
    println!("  install <path>      Build and install the binary to a path");
    println!();
    println!("Examples:");
    println!("  cargo xtask build");
    println!("  cargo xtask build --release");
    println!("  cargo xtask test");
    println!("  cargo xtask format --check");
}

/// Build the backend binary
fn build(sh: &Shell, release: bool) -> Result<()> {
    println!("Building peg-insight...");
    let _dir = sh.push_dir(project_root().join("backend"));

    if release {
        cmd!(sh, "cargo build --release").run().context("failed to build backend in release mode")?;
    } else {
        cmd!(sh, "cargo build").run().context("failed to build backend")?;
    }

    println!("Build complete.");
    Ok(())
}

/// Run all tests
fn test(sh: &Shell) -> Result<()> {
    println!("Running tests...");
    let _dir = sh.push_dir(project_root().join("backend"));

    cmd!(sh, "cargo test --workspace").run().context("tests failed")?;

    println!("All tests passed.");
    Ok(())
}

/// Format code
fn format(sh: &Shell, check: bool) -> Result<()> {
    let _dir = sh.push_dir(project_root().join("backend"));

    if check {
        cmd!(sh, "cargo fmt --all -- --check").run().context("code is not formatted")?;
        println!("Code is properly formatted.");
    } else {
        cmd!(sh, "cargo fmt --all").run().context("failed to format code")?;
        println!("Code formatted.");
    }

    Ok(())
}

/// Run clippy checks
fn clippy(sh: &Shell) -> Result<()> {
    let _dir = sh.push_dir(project_root().join("backend"));

    cmd!(sh, "cargo clippy --all-targets -- --deny warnings").run().context("clippy checks failed")?;

    Ok(())
}

/// Build and run the application
fn run(sh: &Shell, args: &[String]) -> Result<()> {
    println!("Building and running peg-insight...");
    build(sh, false)?;

    let _dir = sh.push_dir(project_root().join("backend"));

    let mut cmd = cmd!(sh, "cargo run --");
    for arg in args {
        cmd = cmd.arg(arg);
    }

    cmd.run().context("failed to run application")?;
    Ok(())
}

/// Clean build artifacts
fn clean(sh: &Shell) -> Result<()> {
    println!("Cleaning build artifacts...");
    let _dir = sh.push_dir(project_root().join("backend"));
    cmd!(sh, "cargo clean").run()?;
    println!("Clean complete.");
    Ok(())
}

/// Run all CI checks (format + clippy + build + test)
fn ci(sh: &Shell) -> Result<()> {
    println!("[1/4] Checking code format...");
    format(sh, true)?;

    println!("[2/4] Running clippy checks...");
    clippy(sh)?;

    println!("[3/4] Building project...");
    build(sh, true)?;

    println!("[4/4] Running tests...");
    test(sh)?;

    println!("CI pipeline completed successfully.");
    Ok(())
}

/// Install the built binary to a destination path
fn install(sh: &Shell, destination: &str) -> Result<()> {
    println!("Installing peg-insight to {}...", destination);
    build(sh, true)?;

    let project = project_root();
    let binary_src = project.join("backend/target/release/peg-insight");
    let dest_path = std::path::Path::new(destination);

    if let Some(parent) = dest_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create destination directory")?;
    }

    std::fs::copy(&binary_src, dest_path).context("failed to copy binary")?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(dest_path)?.permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(dest_path, perms)?;
    }

    println!("Installation complete: {}", destination);
    Ok(())
}

/// Generate a test coverage report via cargo-tarpaulin
fn coverage(sh: &Shell) -> Result<()> {
    println!("Generating test coverage report...");
    let _dir = sh.push_dir(project_root().join("backend"));

    let tarpaulin_check = cmd!(sh, "cargo tarpaulin --version").ignore_status().run();
    if tarpaulin_check.is_err() {
        println!("cargo-tarpaulin not found, installing...");
        cmd!(sh, "cargo install cargo-tarpaulin").run().context("failed to install cargo-tarpaulin")?;
    }

    cmd!(sh, "cargo tarpaulin --workspace --out Html --out Xml --output-dir ../build/coverage")
        .run()
        .context("failed to generate coverage report")?;

    println!("Coverage report generated in build/coverage/.");
    Ok(())
}

/// Get project root directory
fn project_root() -> std::path::PathBuf {
    std::path::Path::new(&env!("CARGO_MANIFEST_DIR")).ancestors().nth(1).unwrap().to_path_buf()
}
