// Build script to capture the build timestamp shown in --version

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let build_time = chrono::Local::now().format("%Y-%m-%d %H:%M:%S %Z").to_string();
    println!("cargo:rustc-env=BUILD_TIMESTAMP={}", build_time);

    // Re-embed the dashboard assets when they change
    println!("cargo:rerun-if-changed=static");
    println!("cargo:rerun-if-changed=src");

    Ok(())
}
