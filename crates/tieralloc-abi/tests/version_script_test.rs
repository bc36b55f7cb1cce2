//! Integration test: export version script
//!
//! Validates that:
//! 1. The version script exports exactly the five allocator symbols.
//! 2. The build script only applies it when the symbols are unmangled,
//!    i.e. without debug assertions; debug test binaries must still link.
//!
//! Run: cargo test -p tieralloc-abi --test version_script_test

use std::path::Path;

fn read(relative: &str) -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(relative);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("{}: {e}", path.display()))
}

#[test]
fn version_script_exports_allocator_symbols_only() {
    let map = read("version_scripts/tieralloc.map");
    let global = map
        .split("global:")
        .nth(1)
        .and_then(|rest| rest.split("local:").next())
        .expect("version script should have a global section");
    let mut symbols: Vec<&str> = global
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    symbols.sort_unstable();
    assert_eq!(symbols, ["calloc", "free", "get_stats", "malloc", "realloc"]);
    assert!(map.contains("local:"));
}

#[test]
fn version_script_is_skipped_with_debug_assertions() {
    let build = read("build.rs");
    let gate = build
        .find("CARGO_CFG_DEBUG_ASSERTIONS")
        .expect("build script should check debug assertions");
    let link_arg = build
        .find("rustc-cdylib-link-arg")
        .expect("build script should pass the version script");
    assert!(gate < link_arg, "debug gate must come before the link arg");
}

#[cfg(debug_assertions)]
#[test]
fn debug_build_links_mangled_entry_points() {
    // Reaching this test at all means the debug cdylib/rlib linked.
    let mut stats = tieralloc_abi::malloc_abi::malloc_stats::default();
    unsafe { tieralloc_abi::malloc_abi::get_stats(&mut stats) };
    assert!(stats.mallocs >= 0);
}
