use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-env-changed=OIDN_DIR");

    // Runtime loading needs nothing from the build.
    if env::var_os("CARGO_FEATURE_LINK").is_none() || env::var("DOCS_RS").is_ok() {
        return;
    }

    let lib_path = if let Ok(dir) = env::var("OIDN_DIR") {
        let root = PathBuf::from(&dir);
        // Try common locations for the OIDN import library (Windows: .lib, Unix: .a or .so)
        ["lib", "lib64", "Release", "Debug"]
            .iter()
            .map(|p| root.join(p))
            .find(|p| p.exists())
            .unwrap_or(root)
    } else {
        match pkg_config::Config::new().probe("OpenImageDenoise") {
            Ok(lib) => lib.link_paths.first().cloned().unwrap_or_default(),
            Err(e) => {
                println!("cargo:warning=oidn-pin: OpenImageDenoise not found via pkg-config: {}", e);
                println!(
                    "cargo:warning=Set OIDN_DIR to the install directory (containing include/ and lib/), install OIDN and pkg-config, or build without the `link` feature."
                );
                panic!("OpenImageDenoise required for the `link` feature. Set OIDN_DIR or use pkg-config.");
            }
        }
    };

    println!("cargo:rustc-link-search=native={}", lib_path.display());
    println!("cargo:rustc-link-lib=OpenImageDenoise");
}
