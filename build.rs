use std::env;
use std::fs;
use std::path::{Path, PathBuf};

fn main() {
    // Embed the Windows manifest that declares per-monitor DPI awareness
    let _ = embed_resource::compile("shop-refresher.rc", embed_resource::NONE);
    println!("cargo:rerun-if-changed=shop-refresher.rc");
    println!("cargo:rerun-if-changed=shop-refresher.manifest");

    // Copy item icons and config next to the executable
    copy_assets();
    copy_config();
}

/// Returns the target profile directory (e.g. `target/release`).
fn target_dir() -> Option<PathBuf> {
    let out_dir = env::var("OUT_DIR").ok()?;
    // OUT_DIR is target/<profile>/build/shop-refresher-xxx/out
    Path::new(&out_dir).ancestors().nth(3).map(Path::to_path_buf)
}

/// Copies the assets folder so the executable can find item icons.
fn copy_assets() {
    let Some(target_dir) = target_dir() else {
        return;
    };

    let assets_src = Path::new("assets");
    if assets_src.exists() {
        copy_dir_recursive(assets_src, &target_dir.join("assets"));
        println!("cargo:rerun-if-changed=assets/");
    }
}

/// Recursively copies a directory and its contents.
fn copy_dir_recursive(src: &Path, dst: &Path) {
    let _ = fs::create_dir_all(dst);

    if let Ok(entries) = fs::read_dir(src) {
        for entry in entries.flatten() {
            let src_path = entry.path();
            let dst_path = dst.join(entry.file_name());

            if src_path.is_dir() {
                copy_dir_recursive(&src_path, &dst_path);
            } else {
                let _ = fs::copy(&src_path, &dst_path);
            }
        }
    }
}

/// Copies config.json to the target directory.
fn copy_config() {
    let Some(target_dir) = target_dir() else {
        return;
    };

    let config_src = Path::new("config.json");
    if config_src.exists() {
        let _ = fs::copy(config_src, target_dir.join("config.json"));
        println!("cargo:rerun-if-changed=config.json");
    }
}
