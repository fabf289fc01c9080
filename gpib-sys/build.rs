fn main() {
    // linux-gpib user library, packaged as libgpib (Debian: libgpib-dev).
    println!("cargo:rustc-link-lib=dylib=gpib");
}
