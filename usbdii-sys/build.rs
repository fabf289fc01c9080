fn main() {
    // Vendor library shipped with the USBDII Linux package as libdcihid.
    println!("cargo:rustc-link-lib=dylib=dcihid");
}
