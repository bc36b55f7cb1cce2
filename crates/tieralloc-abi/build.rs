fn main() {
    println!("cargo:rerun-if-changed=version_scripts/tieralloc.map");
    // The allocator symbols are only unmangled without debug assertions; a
    // version script naming them would fail to link otherwise.
    if std::env::var_os("CARGO_CFG_DEBUG_ASSERTIONS").is_some() {
        return;
    }
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap();
    let version_script = format!("{manifest_dir}/version_scripts/tieralloc.map");
    if std::path::Path::new(&version_script).exists() {
        println!("cargo:rustc-cdylib-link-arg=-Wl,--version-script={version_script}");
    }
}
