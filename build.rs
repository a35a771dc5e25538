//! Build script for MicGuard
//!
//! Embeds the Windows application manifest and links the system
//! libraries used by the tray and audio adapters.

fn main() {
    // Only run on Windows
    if std::env::var("CARGO_CFG_TARGET_OS").map_or(true, |os| os != "windows") {
        return;
    }

    embed_resource::compile("resources/app.rc", embed_resource::NONE);

    println!("cargo:rustc-link-lib=ole32");
    println!("cargo:rustc-link-lib=user32");
    println!("cargo:rustc-link-lib=shell32");
    println!("cargo:rustc-link-lib=advapi32");

    println!("cargo:rerun-if-changed=resources/app.rc");
    println!("cargo:rerun-if-changed=resources/app.manifest");
}
