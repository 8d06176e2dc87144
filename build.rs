use std::{env, path::PathBuf};

fn main() {
    // 1) Load optional env files (still supported for convenience)
    let _ = dotenvy::from_filename(".env");
    load_home_env(".pico.env");
    load_home_env(".env");

    // 2) Timer tick rate of the capture hardware (bus clock / prescaler), in ticks per µs.
    //    48 matches a 48 MHz bus clock with no prescaler.
    let ticks_per_us = env_or_default("LIGHTHOUSE_TICKS_PER_US", "48");

    if ticks_per_us.parse::<u32>().map_or(true, |ticks| ticks == 0) {
        println!(
            "cargo:warning=LIGHTHOUSE_TICKS_PER_US={ticks_per_us} is not a positive integer; using 48"
        );
        println!("cargo:rustc-env=LIGHTHOUSE_TICKS_PER_US=48");
    } else {
        // 3) Expose as compile-time constant
        println!("cargo:rustc-env=LIGHTHOUSE_TICKS_PER_US={ticks_per_us}");
    }

    // Optional: don't rebuild unless these change
    println!("cargo:rerun-if-env-changed=LIGHTHOUSE_TICKS_PER_US");
    println!("cargo:rerun-if-changed=.env");
}

fn load_home_env(file: &str) {
    let home = match env::var_os("USERPROFILE").or_else(|| env::var_os("HOME")) {
        Some(path) => PathBuf::from(path),
        None => return,
    };
    let path = home.join(file);
    let _ = dotenvy::from_path(&path);
}

fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
