//! Build script for hybridpool.
//!
//! Provides build-time diagnostics and feature-detection hints for users
//! integrating hybridpool into their projects.

use std::env;

fn main() {
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_SHM");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_GPU_VULKAN");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_PARKING_LOT");

    let shm_enabled = env::var("CARGO_FEATURE_SHM").is_ok();
    let gpu_vulkan_enabled = env::var("CARGO_FEATURE_GPU_VULKAN").is_ok();
    let parking_lot_enabled = env::var("CARGO_FEATURE_PARKING_LOT").is_ok();

    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());
    let is_release = profile == "release";

    if !shm_enabled {
        emit_warning("'shm' feature disabled: only DummySegment is available");
        emit_note("cross-process pooling requires a real Segment backend");
        emit_note("enable it with: hybridpool = { version = \"0.1\", features = [\"shm\"] }");
    }

    if gpu_vulkan_enabled {
        emit_info("Vulkan external-memory backend enabled");
        emit_note("GPU buffers will be exported via VK_KHR_external_memory and");
        emit_note("duplicated into peer processes on createLocal()");
    } else {
        emit_note("Tip: enable 'gpu-vulkan' to back GPU pool requests with real external memory:");
        emit_note("  hybridpool = { version = \"0.1\", features = [\"gpu-vulkan\"] }");
    }

    if parking_lot_enabled {
        emit_info("Using parking_lot for the local handle-cache mutex");
    } else if is_release {
        emit_note("Tip: enable 'parking_lot' for a faster local handle-cache mutex");
    }

    check_target();
}

fn emit_info(msg: &str) {
    println!("cargo:warning=[hybridpool] info: {}", msg);
}

fn emit_note(msg: &str) {
    println!("cargo:warning=[hybridpool]   note: {}", msg);
}

fn emit_warning(msg: &str) {
    println!("cargo:warning=[hybridpool] warning: {}", msg);
}

fn check_target() {
    let target = env::var("TARGET").unwrap_or_default();

    if target.contains("windows") {
        emit_info("Building for Windows: handle duplication uses DuplicateHandle");
    } else if target.contains("linux") || target.contains("darwin") || target.contains("bsd") {
        emit_info("Building for a POSIX target: handle duplication uses /proc/<pid>/fd");
    } else {
        emit_warning("Unrecognized target: OS handle duplication may be unimplemented");
    }
}
