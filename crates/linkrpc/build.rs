// Expose the build target and profile to `linkrpc version --extended`.
fn main() {
    for (var, exported) in [("TARGET", "LINKRPC_TARGET"), ("PROFILE", "LINKRPC_PROFILE")] {
        println!("cargo:rerun-if-env-changed={var}");
        if let Ok(value) = std::env::var(var) {
            println!("cargo:rustc-env={exported}={value}");
        }
    }
}
