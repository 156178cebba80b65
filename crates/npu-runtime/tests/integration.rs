// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Integration tests: the full runtime flow across every manager.
//!
//! These tests drive device activation → context → memory → model load →
//! IO binding → blocking and stream-ordered execution → teardown, and check
//! the cross-manager guarantees: handle invalidation, thread-local current
//! context, in-order streams and the device reset cascade.

use model_image::{ImageBuilder, ModelKind};
use npu_memory::MemKind;
use npu_runtime::{
    AllocPolicy, CopyKind, DType, Direction, ErrorKind, Layout, MemPtr, ModelState, Runtime,
    RuntimeConfig, VNpuKind,
};
use std::time::Duration;
use tensor_meta::Shape;

// ── Helpers ────────────────────────────────────────────────────

fn runtime() -> Runtime {
    let config = RuntimeConfig {
        simulate_latency: false,
        ..RuntimeConfig::with_devices(2)
    };
    Runtime::new(config).unwrap()
}

fn latency_runtime() -> Runtime {
    Runtime::new(RuntimeConfig::with_devices(2)).unwrap()
}

/// `x: u8[1,16]` → `y: u8[1,32]`, with a small weight blob.
fn tiny_image() -> Vec<u8> {
    ImageBuilder::new("tiny", ModelKind::OneCore)
        .compiler_version("5.0")
        .input("x", DType::Uint8, Layout::None, vec![Shape::new(vec![1, 16])])
        .output("y", DType::Uint8, Layout::None, vec![Shape::new(vec![1, 32])])
        .weights(vec![7; 256])
        .build()
        .unwrap()
}

/// `x: u8[16]` → `y: u8[16]`, taking `latency_us` per run.
fn copy_image(latency_us: u64) -> Vec<u8> {
    ImageBuilder::new("copy", ModelKind::OneCore)
        .latency_us(latency_us)
        .input("x", DType::Uint8, Layout::None, vec![Shape::new(vec![16])])
        .output("y", DType::Uint8, Layout::None, vec![Shape::new(vec![16])])
        .build()
        .unwrap()
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 + 7) as u8).collect()
}

/// Uploads `data` into a fresh device buffer on the current context.
fn device_with(rt: &Runtime, data: &[u8]) -> MemPtr {
    let mem = rt.memory();
    let host = mem.alloc_host(data.len()).unwrap();
    mem.write_mapped(host, data).unwrap();
    let dev = mem.alloc_device(data.len(), AllocPolicy::NormalOnly).unwrap();
    mem.copy(dev, host, data.len(), CopyKind::HostToDevice).unwrap();
    mem.free_host(host).unwrap();
    dev
}

fn download(rt: &Runtime, dev: MemPtr, len: usize) -> Vec<u8> {
    let mem = rt.memory();
    let host = mem.alloc_host(len).unwrap();
    mem.copy(host, dev, len, CopyKind::DeviceToHost).unwrap();
    let out = mem.read_mapped(host, len).unwrap();
    mem.free_host(host).unwrap();
    out
}

// ── End-to-end ─────────────────────────────────────────────────

#[test]
fn test_end_to_end_pipeline() {
    let rt = runtime();
    rt.contexts().create(0).unwrap();
    let engine = rt.engine();
    engine.init(VNpuKind::Disable).unwrap();

    let model = engine.load_from_memory(&tiny_image()).unwrap();
    assert_eq!(engine.model_state(model).unwrap(), ModelState::Loaded);
    assert_eq!(engine.model_kind(model).unwrap(), ModelKind::OneCore);
    assert_eq!(engine.compiler_version(model).unwrap(), "5.0");
    assert_eq!(engine.weights_region(model).unwrap().map(|(_, n)| n), Some(256));

    let info = engine.get_io_info(model).unwrap();
    assert_eq!(engine.num_inputs(info).unwrap(), 1);
    assert_eq!(engine.num_outputs(info).unwrap(), 1);
    assert_eq!(engine.num_groups(info).unwrap(), 1);
    let y = engine.output(info, 0, 0).unwrap();
    assert_eq!((y.name.as_str(), y.size), ("y", 32));
    assert_eq!(engine.index_of(info, Direction::Input, "x").unwrap(), 0);
    assert_eq!(engine.tensor_name(info, Direction::Output, 0).unwrap(), "y");

    let input = pattern(16);
    let x_dev = device_with(&rt, &input);
    let y_dev = rt.memory().alloc_device(32, AllocPolicy::NormalOnly).unwrap();

    let set = engine.create_io(info).unwrap();
    engine.bind_input_by_name(set, "x", x_dev, 16).unwrap();
    engine.bind_output(set, 0, y_dev, 32).unwrap();
    assert_eq!(engine.buffer_by_name(set, Direction::Output, "y").unwrap().map(|b| b.ptr), Some(y_dev));

    let ctx = engine.create_context(model).unwrap();
    engine.execute(model, ctx, 0, set).unwrap();

    let expected: Vec<u8> = input.iter().copied().cycle().take(32).collect();
    assert_eq!(download(&rt, y_dev, 32), expected);
    assert_eq!(engine.model_state(model).unwrap(), ModelState::Executed);

    let metrics = engine.metrics(model).unwrap();
    assert_eq!(metrics.executions, 1);
    assert_eq!(metrics.bytes_out, 32);

    engine.destroy_context(ctx).unwrap();
    engine.destroy_io(set).unwrap();
    engine.destroy_io_info(info).unwrap();
    engine.unload(model).unwrap();
    engine.finalize().unwrap();
}

#[test]
fn test_load_from_file_and_host() {
    let rt = runtime();
    rt.contexts().create(0).unwrap();
    let engine = rt.engine();
    engine.init(VNpuKind::Disable).unwrap();

    let path = std::env::temp_dir().join(format!("npu-rt-it-{}.model", std::process::id()));
    let bytes = tiny_image();
    std::fs::write(&path, &bytes).unwrap();
    assert_eq!(engine.kind_from_file(&path).unwrap(), ModelKind::OneCore);
    let usage = engine.usage_from_file(&path).unwrap();
    assert_eq!(usage, engine.usage_from_memory(&bytes).unwrap());

    let from_file = engine.load_from_file(&path).unwrap();
    assert_eq!(engine.usage(from_file).unwrap(), usage);
    std::fs::remove_file(&path).unwrap();

    let staged = rt.memory().alloc_host(bytes.len()).unwrap();
    rt.memory().write_mapped(staged, &bytes).unwrap();
    let from_host = engine.load_from_host(staged, bytes.len()).unwrap();
    assert_ne!(from_file, from_host);
    assert_eq!(engine.models(), vec![from_file, from_host]);

    assert_eq!(
        engine.load_from_host(MemPtr::NULL, 16).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
    assert_eq!(engine.load_from_memory(&[]).unwrap_err().kind(), ErrorKind::InvalidArgument);
    assert_eq!(
        engine.load_from_memory(b"not a model").unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
}

#[test]
fn test_overflowing_tensor_dims_are_rejected() {
    let rt = runtime();
    rt.contexts().create(0).unwrap();
    let engine = rt.engine();
    engine.init(VNpuKind::Disable).unwrap();

    // Hand-assembled image: the builder refuses to emit this manifest.
    let json = r#"{"name":"huge","kind":"1core",
        "inputs":[{"name":"x","dtype":"fp32","shape_groups":[[4294967296,4294967296]]}],
        "outputs":[{"name":"y","dtype":"uint8","shape_groups":[[4]]}]}"#;
    let mut bytes = b"NPUMODEL".to_vec();
    bytes.extend_from_slice(&1u32.to_le_bytes());
    bytes.extend_from_slice(&(json.len() as u32).to_le_bytes());
    bytes.extend_from_slice(json.as_bytes());

    assert_eq!(engine.load_from_memory(&bytes).unwrap_err().kind(), ErrorKind::InvalidArgument);
    assert_eq!(engine.usage_from_memory(&bytes).unwrap_err().kind(), ErrorKind::InvalidArgument);
    assert_eq!(engine.kind_from_memory(&bytes).unwrap_err().kind(), ErrorKind::InvalidArgument);
    assert!(engine.models().is_empty());
    engine.load_from_memory(&tiny_image()).unwrap();
}

#[test]
fn test_engine_requires_init_and_context() {
    let rt = runtime();
    let engine = rt.engine();
    assert_eq!(engine.load_from_memory(&tiny_image()).unwrap_err().kind(), ErrorKind::InvalidState);
    assert_eq!(engine.vnpu_kind().unwrap_err().kind(), ErrorKind::InvalidState);
    assert_eq!(engine.finalize().unwrap_err().kind(), ErrorKind::InvalidState);

    engine.init(VNpuKind::Enable).unwrap();
    engine.init(VNpuKind::Enable).unwrap();
    assert_eq!(engine.init(VNpuKind::Disable).unwrap_err().kind(), ErrorKind::InvalidState);
    // No context and no active device on this thread.
    assert_eq!(engine.load_from_memory(&tiny_image()).unwrap_err().kind(), ErrorKind::InvalidState);
}

#[test]
fn test_unload_invalidates_derived_handles() {
    let rt = runtime();
    rt.contexts().create(0).unwrap();
    let engine = rt.engine();
    engine.init(VNpuKind::Disable).unwrap();

    let model = engine.load_from_memory(&tiny_image()).unwrap();
    let info = engine.get_io_info(model).unwrap();
    let set = engine.create_io(info).unwrap();
    let ctx = engine.create_context(model).unwrap();
    engine.unload(model).unwrap();

    assert_eq!(engine.model_state(model).unwrap_err().kind(), ErrorKind::InvalidHandle);
    assert_eq!(engine.num_inputs(info).unwrap_err().kind(), ErrorKind::InvalidHandle);
    assert_eq!(engine.dynamic_batch(set).unwrap_err().kind(), ErrorKind::InvalidHandle);
    assert_eq!(engine.destroy_context(ctx).unwrap_err().kind(), ErrorKind::InvalidHandle);
    assert_eq!(engine.execute(model, ctx, 0, set).unwrap_err().kind(), ErrorKind::InvalidHandle);
    assert_eq!(engine.unload(model).unwrap_err().kind(), ErrorKind::InvalidHandle);

    // Handles are not reused.
    let again = engine.load_from_memory(&tiny_image()).unwrap();
    assert_ne!(again, model);
}

#[test]
fn test_execute_rejects_foreign_handles() {
    let rt = runtime();
    rt.contexts().create(0).unwrap();
    let engine = rt.engine();
    engine.init(VNpuKind::Disable).unwrap();

    let a = engine.load_from_memory(&tiny_image()).unwrap();
    let b = engine.load_from_memory(&tiny_image()).unwrap();
    let set_a = engine.create_io(engine.get_io_info(a).unwrap()).unwrap();
    let ctx_a = engine.create_context(a).unwrap();
    let ctx_b = engine.create_context(b).unwrap();

    assert_eq!(engine.execute(a, ctx_b, 0, set_a).unwrap_err().kind(), ErrorKind::InvalidHandle);
    assert_eq!(engine.execute(b, ctx_b, 0, set_a).unwrap_err().kind(), ErrorKind::InvalidHandle);
    // The set is checked only after model and context pass, and it is unbound.
    assert_eq!(engine.execute(a, ctx_a, 0, set_a).unwrap_err().kind(), ErrorKind::IoBindingIncomplete);
    assert_eq!(engine.execute(a, ctx_a, 1, set_a).unwrap_err().kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_bindings_must_live_on_the_model_device() {
    let rt = runtime();
    let ctx0 = rt.contexts().create(0).unwrap();
    let ctx1 = rt.contexts().create(1).unwrap();
    rt.contexts().set_current(ctx0).unwrap();
    let engine = rt.engine();
    engine.init(VNpuKind::Disable).unwrap();

    let model = engine.load_from_memory(&copy_image(0)).unwrap();
    let set = engine.create_io(engine.get_io_info(model).unwrap()).unwrap();
    let exec = engine.create_context(model).unwrap();
    let x_dev = device_with(&rt, &pattern(16));
    let y_dev = rt.memory().alloc_device(16, AllocPolicy::NormalOnly).unwrap();
    let host = rt.memory().alloc_host(16).unwrap();
    let remote = rt.memory().alloc_device_in(ctx1, 16, AllocPolicy::NormalOnly).unwrap();
    rt.memory().set(y_dev, 0xAA, 16).unwrap();

    // Pinned host memory as input.
    engine.bind_input(set, 0, host, 16).unwrap();
    engine.bind_output(set, 0, y_dev, 16).unwrap();
    let err = engine.execute(model, exec, 0, set).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IoBindingIncomplete);
    assert!(err.to_string().contains("'x'"));

    // A block on another device as output.
    engine.bind_input(set, 0, x_dev, 16).unwrap();
    engine.bind_output(set, 0, remote, 16).unwrap();
    let err = engine.execute(model, exec, 0, set).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IoBindingIncomplete);
    assert!(err.to_string().contains("device 1"));
    assert_eq!(download(&rt, y_dev, 16), vec![0xAA; 16]);
    assert_eq!(engine.metrics(model).unwrap().executions, 0);

    engine.bind_output(set, 0, y_dev, 16).unwrap();
    engine.execute(model, exec, 0, set).unwrap();
    assert_eq!(download(&rt, y_dev, 16), pattern(16));
}

#[test]
fn test_unbound_input_leaves_outputs_untouched() {
    let rt = runtime();
    rt.contexts().create(0).unwrap();
    let engine = rt.engine();
    engine.init(VNpuKind::Disable).unwrap();

    let model = engine.load_from_memory(&tiny_image()).unwrap();
    let info = engine.get_io_info(model).unwrap();
    let set = engine.create_io(info).unwrap();
    let y_dev = rt.memory().alloc_device(32, AllocPolicy::NormalOnly).unwrap();
    rt.memory().set(y_dev, 0xAA, 32).unwrap();
    engine.bind_output(set, 0, y_dev, 32).unwrap();

    let ctx = engine.create_context(model).unwrap();
    let err = engine.execute(model, ctx, 0, set).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IoBindingIncomplete);
    assert!(err.to_string().contains("'x'"));
    assert_eq!(download(&rt, y_dev, 32), vec![0xAA; 32]);
    assert_eq!(engine.metrics(model).unwrap().executions, 0);

    // An undersized output is rejected the same way.
    let x_dev = device_with(&rt, &pattern(16));
    engine.bind_input(set, 0, x_dev, 16).unwrap();
    engine.bind_output(set, 0, y_dev, 31).unwrap();
    assert_eq!(engine.execute(model, ctx, 0, set).unwrap_err().kind(), ErrorKind::IoBindingIncomplete);
    assert_eq!(download(&rt, y_dev, 32), vec![0xAA; 32]);
}

#[test]
fn test_dynamic_batch_shrinks_buffers() {
    let rt = runtime();
    rt.contexts().create(0).unwrap();
    let engine = rt.engine();
    engine.init(VNpuKind::Disable).unwrap();

    let bytes = ImageBuilder::new("batched", ModelKind::OneCore)
        .batched_input("x", DType::Uint8, Layout::Nhwc, vec![Shape::new(vec![4, 8])])
        .batched_output("y", DType::Uint8, Layout::Nhwc, vec![Shape::new(vec![4, 8])])
        .build()
        .unwrap();
    let model = engine.load_from_memory(&bytes).unwrap();
    let info = engine.get_io_info(model).unwrap();
    assert!(engine.input(info, 0, 0).unwrap().batch_variable);

    let set = engine.create_io(info).unwrap();
    let x_dev = device_with(&rt, &pattern(16));
    let y_dev = rt.memory().alloc_device(16, AllocPolicy::NormalOnly).unwrap();
    engine.bind_input(set, 0, x_dev, 16).unwrap();
    engine.bind_output(set, 0, y_dev, 16).unwrap();
    let ctx = engine.create_context(model).unwrap();

    assert_eq!(engine.execute(model, ctx, 0, set).unwrap_err().kind(), ErrorKind::IoBindingIncomplete);
    engine.set_dynamic_batch(set, 2).unwrap();
    assert_eq!(engine.dynamic_batch(set).unwrap(), Some(2));
    engine.execute(model, ctx, 0, set).unwrap();
    assert_eq!(download(&rt, y_dev, 16), pattern(16));

    engine.set_dynamic_batch(set, 5).unwrap();
    assert_eq!(engine.execute(model, ctx, 0, set).unwrap_err().kind(), ErrorKind::InvalidArgument);
    assert_eq!(engine.set_dynamic_batch(set, 0).unwrap_err().kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_vnpu_kind_limits_models_and_affinity() {
    let rt = runtime();
    rt.contexts().create(0).unwrap();
    let engine = rt.engine();
    engine.init(VNpuKind::BigLittle).unwrap();
    assert_eq!(engine.vnpu_kind().unwrap(), VNpuKind::BigLittle);

    let three = ImageBuilder::new("big", ModelKind::ThreeCore)
        .input("x", DType::Uint8, Layout::None, vec![Shape::new(vec![4])])
        .output("y", DType::Uint8, Layout::None, vec![Shape::new(vec![4])])
        .build()
        .unwrap();
    assert_eq!(engine.kind_from_memory(&three).unwrap(), ModelKind::ThreeCore);
    assert_eq!(engine.load_from_memory(&three).unwrap_err().kind(), ErrorKind::InvalidArgument);

    let two = ImageBuilder::new("mid", ModelKind::TwoCore)
        .input("x", DType::Uint8, Layout::None, vec![Shape::new(vec![4])])
        .output("y", DType::Uint8, Layout::None, vec![Shape::new(vec![4])])
        .build()
        .unwrap();
    let model = engine.load_from_memory(&two).unwrap();
    assert_eq!(engine.affinity(model).unwrap(), 0b01);
    assert_eq!(engine.set_affinity(model, 0b10).unwrap_err().kind(), ErrorKind::InvalidArgument);
    assert_eq!(engine.set_affinity(model, 0).unwrap_err().kind(), ErrorKind::InvalidArgument);
    engine.set_affinity(model, 0b01).unwrap();

    let one = engine.load_from_memory(&tiny_image()).unwrap();
    assert_eq!(engine.affinity(one).unwrap(), 0b11);
    engine.set_affinity(one, 0b10).unwrap();
    assert_eq!(engine.affinity(one).unwrap(), 0b10);
}

// ── Contexts and threads ───────────────────────────────────────

#[test]
fn test_current_context_is_thread_local() {
    let rt = runtime();
    let main_ctx = rt.contexts().create(0).unwrap();

    std::thread::scope(|s| {
        s.spawn(|| {
            assert_eq!(rt.contexts().get_current().unwrap_err().kind(), ErrorKind::InvalidState);
            let worker_ctx = rt.contexts().create(1).unwrap();
            assert_eq!(rt.contexts().get_current().unwrap(), worker_ctx);
            assert_eq!(rt.contexts().current_device().unwrap(), 1);
        })
        .join()
        .unwrap();
    });

    assert_eq!(rt.contexts().get_current().unwrap(), main_ctx);
    assert_eq!(rt.contexts().current_device().unwrap(), 0);
    assert_eq!(rt.contexts().count(), 2);
}

#[test]
fn test_scope_restores_previous_context() {
    let rt = runtime();
    let outer = rt.contexts().create(0).unwrap();
    let inner = rt.contexts().create(1).unwrap();
    rt.contexts().set_current(outer).unwrap();
    {
        let _scope = rt.contexts().scope(inner).unwrap();
        assert_eq!(rt.contexts().get_current().unwrap(), inner);
        let dev = rt.memory().alloc_device(64, AllocPolicy::NormalOnly).unwrap();
        assert_eq!(dev.kind(), Some(MemKind::Device(1)));
        assert_eq!(rt.memory().block(dev, 64).unwrap().size, 64);
    }
    assert_eq!(rt.contexts().get_current().unwrap(), outer);
}

#[test]
fn test_default_context_is_shared_and_permanent() {
    let rt = runtime();
    let a = rt.contexts().get_or_create_default(0).unwrap();
    let b = rt.contexts().get_or_create_default(0).unwrap();
    assert_eq!(a, b);
    assert_eq!(rt.contexts().destroy(a).unwrap_err().kind(), ErrorKind::InvalidState);
    assert!(rt.devices().is_active(0));
}

#[test]
fn test_context_with_live_stream_is_busy() {
    let rt = runtime();
    let ctx = rt.contexts().create(0).unwrap();
    let stream = rt.streams().create(ctx).unwrap();
    assert_eq!(rt.contexts().destroy(ctx).unwrap_err().kind(), ErrorKind::Busy);
    rt.streams().destroy(stream).unwrap();
    rt.contexts().destroy(ctx).unwrap();
    assert_eq!(rt.streams().wait(stream).unwrap_err().kind(), ErrorKind::InvalidHandle);
}

// ── Streams ────────────────────────────────────────────────────

#[test]
fn test_stream_preserves_submission_order() {
    let rt = latency_runtime();
    let ctx = rt.contexts().create(0).unwrap();
    let engine = rt.engine();
    engine.init(VNpuKind::Disable).unwrap();

    // A is slow; B reads A's output. Out-of-order execution would read zeros.
    let slow = engine.load_from_memory(&copy_image(30_000)).unwrap();
    let fast = engine.load_from_memory(&copy_image(0)).unwrap();
    let input = pattern(16);
    let a_in = device_with(&rt, &input);
    let mid = rt.memory().alloc_device(16, AllocPolicy::NormalOnly).unwrap();
    let b_out = rt.memory().alloc_device(16, AllocPolicy::NormalOnly).unwrap();

    let set_a = engine.create_io(engine.get_io_info(slow).unwrap()).unwrap();
    engine.bind_input(set_a, 0, a_in, 16).unwrap();
    engine.bind_output(set_a, 0, mid, 16).unwrap();
    let set_b = engine.create_io(engine.get_io_info(fast).unwrap()).unwrap();
    engine.bind_input(set_b, 0, mid, 16).unwrap();
    engine.bind_output(set_b, 0, b_out, 16).unwrap();
    let ctx_a = engine.create_context(slow).unwrap();
    let ctx_b = engine.create_context(fast).unwrap();

    let stream = rt.streams().create(ctx).unwrap();
    engine.execute_async(slow, ctx_a, 0, set_a, stream).unwrap();
    engine.execute_async(fast, ctx_b, 0, set_b, stream).unwrap();
    rt.streams().wait(stream).unwrap();

    assert_eq!(download(&rt, b_out, 16), input);
    assert_eq!(engine.metrics(slow).unwrap().async_executions, 1);
    assert_eq!(engine.metrics(fast).unwrap().async_executions, 1);
    rt.streams().destroy(stream).unwrap();
}

#[test]
fn test_async_failure_surfaces_on_wait() {
    let rt = latency_runtime();
    let ctx = rt.contexts().create(0).unwrap();
    let engine = rt.engine();
    engine.init(VNpuKind::Disable).unwrap();

    let slow = engine.load_from_memory(&copy_image(50_000)).unwrap();
    let fast = engine.load_from_memory(&copy_image(0)).unwrap();
    let set_slow = engine.create_io(engine.get_io_info(slow).unwrap()).unwrap();
    let set_fast = engine.create_io(engine.get_io_info(fast).unwrap()).unwrap();
    for set in [set_slow, set_fast] {
        let x = device_with(&rt, &pattern(16));
        let y = rt.memory().alloc_device(16, AllocPolicy::NormalOnly).unwrap();
        engine.bind_input(set, 0, x, 16).unwrap();
        engine.bind_output(set, 0, y, 16).unwrap();
    }
    let doomed_input = engine.buffer(set_fast, Direction::Input, 0).unwrap().unwrap().ptr;

    let stream = rt.streams().create(ctx).unwrap();
    let ctx_slow = engine.create_context(slow).unwrap();
    let ctx_fast = engine.create_context(fast).unwrap();
    engine.execute_async(slow, ctx_slow, 0, set_slow, stream).unwrap();
    engine.execute_async(fast, ctx_fast, 0, set_fast, stream).unwrap();
    // Released while the slow op still occupies the stream.
    rt.memory().free(doomed_input).unwrap();

    let err = rt.streams().wait(stream).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IoBindingIncomplete);
    assert_eq!(engine.metrics(fast).unwrap().failures, 1);
    // The error is reported once.
    rt.streams().wait(stream).unwrap();
}

#[test]
fn test_async_rejects_stream_on_other_device() {
    let rt = runtime();
    let ctx0 = rt.contexts().create(0).unwrap();
    let ctx1 = rt.contexts().create(1).unwrap();
    rt.contexts().set_current(ctx0).unwrap();
    let engine = rt.engine();
    engine.init(VNpuKind::Disable).unwrap();

    let model = engine.load_from_memory(&copy_image(0)).unwrap();
    let set = engine.create_io(engine.get_io_info(model).unwrap()).unwrap();
    engine.bind_input(set, 0, device_with(&rt, &pattern(16)), 16).unwrap();
    engine
        .bind_output(set, 0, rt.memory().alloc_device(16, AllocPolicy::NormalOnly).unwrap(), 16)
        .unwrap();
    let exec = engine.create_context(model).unwrap();

    let remote = rt.streams().create(ctx1).unwrap();
    assert_eq!(
        engine.execute_async(model, exec, 0, set, remote).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
}

#[test]
fn test_wait_timeout_and_synchronize_all() {
    let rt = latency_runtime();
    let ctx = rt.contexts().create(0).unwrap();
    let engine = rt.engine();
    engine.init(VNpuKind::Disable).unwrap();

    let model = engine.load_from_memory(&copy_image(40_000)).unwrap();
    let set = engine.create_io(engine.get_io_info(model).unwrap()).unwrap();
    engine.bind_input(set, 0, device_with(&rt, &pattern(16)), 16).unwrap();
    engine
        .bind_output(set, 0, rt.memory().alloc_device(16, AllocPolicy::NormalOnly).unwrap(), 16)
        .unwrap();
    let exec = engine.create_context(model).unwrap();

    let stream = rt.streams().create(ctx).unwrap();
    engine.execute_async(model, exec, 0, set, stream).unwrap();
    assert!(!rt.streams().wait_timeout(stream, Duration::from_millis(1)).unwrap());
    assert_eq!(
        rt.streams().wait_for(stream, Duration::from_millis(1)).unwrap_err().kind(),
        ErrorKind::Timeout
    );

    engine.execute_async(model, exec, 0, set, stream).unwrap();
    rt.devices().synchronize_all().unwrap();
    assert!(rt.streams().wait_timeout(stream, Duration::ZERO).unwrap());
    assert_eq!(engine.metrics(model).unwrap().async_executions, 2);
}

#[test]
fn test_forced_destroy_reports_abandoned_work() {
    let rt = latency_runtime();
    let ctx = rt.contexts().create(0).unwrap();
    let engine = rt.engine();
    engine.init(VNpuKind::Disable).unwrap();

    let model = engine.load_from_memory(&copy_image(30_000)).unwrap();
    let set = engine.create_io(engine.get_io_info(model).unwrap()).unwrap();
    engine.bind_input(set, 0, device_with(&rt, &pattern(16)), 16).unwrap();
    engine
        .bind_output(set, 0, rt.memory().alloc_device(16, AllocPolicy::NormalOnly).unwrap(), 16)
        .unwrap();
    let exec = engine.create_context(model).unwrap();

    let stream = rt.streams().create(ctx).unwrap();
    for _ in 0..3 {
        engine.execute_async(model, exec, 0, set, stream).unwrap();
    }
    let report = rt.streams().destroy_force(stream).unwrap();
    assert!(!report.is_clean());
    assert!(report.abandoned_ops >= 2);
    assert_eq!(report.regions.len(), 2);
    assert_eq!(rt.streams().wait(stream).unwrap_err().kind(), ErrorKind::InvalidHandle);

    // The context can go once its stream is gone.
    rt.devices().synchronize_all().unwrap();
    rt.contexts().destroy(ctx).unwrap();
}

// ── Memory ─────────────────────────────────────────────────────

#[test]
fn test_copy_round_trips_across_sizes() {
    let rt = runtime();
    rt.contexts().create(0).unwrap();
    let mem = rt.memory();

    for size in [1, 4095, 4096, 65_537, 3 << 20] {
        let data = pattern(size);
        let src = mem.alloc_host(size).unwrap();
        let dst = mem.alloc_host(size).unwrap();
        let d1 = mem.alloc_device(size, AllocPolicy::HugeFirst).unwrap();
        let d2 = mem.alloc_device(size, AllocPolicy::NormalOnly).unwrap();

        mem.write_mapped(src, &data).unwrap();
        mem.copy(d1, src, size, CopyKind::HostToDevice).unwrap();
        mem.copy(d2, d1, size, CopyKind::DeviceToDevice).unwrap();
        mem.copy(dst, d2, size, CopyKind::DeviceToHost).unwrap();

        assert!(mem.compare(src, dst, size).unwrap(), "size {size}");
        assert_eq!(mem.read_mapped(dst, size).unwrap(), data);

        for ptr in [d1, d2] {
            mem.free(ptr).unwrap();
        }
        for ptr in [src, dst] {
            mem.free_host(ptr).unwrap();
        }
    }
    assert_eq!(mem.device_usage(0).unwrap().live(), 0);
    assert_eq!(mem.host_usage().live(), 0);
}

#[test]
fn test_copy_direction_is_checked() {
    let rt = runtime();
    rt.contexts().create(0).unwrap();
    let mem = rt.memory();
    let host = mem.alloc_host(64).unwrap();
    let dev = mem.alloc_device(64, AllocPolicy::NormalOnly).unwrap();
    assert_eq!(
        mem.copy(dev, host, 64, CopyKind::DeviceToHost).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );

    let phys = mem.host_physical_address(host).unwrap();
    mem.set(dev, 9, 64).unwrap();
    mem.copy(phys, dev, 64, CopyKind::DeviceToHostPhys).unwrap();
    assert_eq!(mem.read_mapped(host, 64).unwrap(), vec![9; 64]);
}

#[test]
fn test_set_and_compare_interior_ranges() {
    let rt = runtime();
    rt.contexts().create(0).unwrap();
    let mem = rt.memory();
    let a = mem.alloc_device(1024, AllocPolicy::NormalOnly).unwrap();
    let b = mem.alloc_device(1024, AllocPolicy::NormalOnly).unwrap();

    mem.set(a, 0x5A, 1024).unwrap();
    mem.set(b, 0x5A, 1024).unwrap();
    assert!(mem.compare(a, b, 1024).unwrap());

    mem.set(b.offset(512), 0, 16).unwrap();
    assert!(!mem.compare(a, b, 1024).unwrap());
    assert!(mem.compare(a, b, 512).unwrap());
    assert!(mem.compare(a.offset(528), b.offset(528), 496).unwrap());

    // Past the end of the block.
    assert_eq!(mem.set(a.offset(1000), 1, 100).unwrap_err().kind(), ErrorKind::InvalidArgument);
    assert_eq!(mem.compare(MemPtr::NULL, b, 4).unwrap_err().kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_cached_block_needs_flush_and_invalidate() {
    let rt = runtime();
    rt.contexts().create(0).unwrap();
    let mem = rt.memory();
    let cached = mem.alloc_device_cached(256, AllocPolicy::NormalOnly).unwrap();

    mem.write_mapped(cached, &[3; 256]).unwrap();
    assert_eq!(download(&rt, cached, 256), vec![0; 256]);
    mem.flush(cached, 256).unwrap();
    assert_eq!(download(&rt, cached, 256), vec![3; 256]);

    mem.set(cached, 8, 256).unwrap();
    assert_eq!(mem.read_mapped(cached, 256).unwrap(), vec![3; 256]);
    mem.invalidate(cached, 256).unwrap();
    assert_eq!(mem.read_mapped(cached, 256).unwrap(), vec![8; 256]);
}

#[test]
fn test_alloc_free_cycles_recycle_addresses() {
    let rt = runtime();
    rt.contexts().create(0).unwrap();
    let mem = rt.memory();

    let first = mem.alloc_device(4096, AllocPolicy::NormalOnly).unwrap();
    mem.free(first).unwrap();
    for _ in 0..100 {
        let ptr = mem.alloc_device(4000, AllocPolicy::NormalOnly).unwrap();
        assert_eq!(ptr, first);
        mem.free(ptr).unwrap();
    }
    assert_eq!(mem.free(first).unwrap_err().kind(), ErrorKind::InvalidArgument);

    let stats = mem.device_stats(0).unwrap();
    assert_eq!(stats.total_allocations, 101);
    assert_eq!(stats.recycled, 100);
    assert_eq!(mem.device_usage(0).unwrap().live(), 0);
}

#[test]
fn test_device_memory_exhaustion() {
    let mut config = RuntimeConfig::default();
    config.devices[0].cmm_memory = npu_runtime::MemoryBudget::from_mb(2);
    config.devices[0].huge_memory = npu_runtime::MemoryBudget::from_mb(1);
    let rt = Runtime::new(config).unwrap();
    rt.contexts().create(0).unwrap();
    let mem = rt.memory();

    let huge = mem.alloc_device(1 << 20, AllocPolicy::HugeOnly).unwrap();
    assert_eq!(
        mem.alloc_device(1, AllocPolicy::HugeOnly).unwrap_err().kind(),
        ErrorKind::OutOfResources
    );
    // Falls back to the normal pool.
    mem.alloc_device(4096, AllocPolicy::HugeFirst).unwrap();
    assert_eq!(mem.device_stats(0).unwrap().huge_fallbacks, 1);
    assert_eq!(
        mem.alloc_device(2 << 20, AllocPolicy::NormalOnly).unwrap_err().kind(),
        ErrorKind::OutOfResources
    );
    mem.free(huge).unwrap();
}

#[test]
fn test_oversized_allocation_keeps_device_usable() {
    let rt = runtime();
    rt.contexts().create(0).unwrap();
    let mem = rt.memory();

    let small = mem.alloc_device(16, AllocPolicy::NormalOnly).unwrap();
    for policy in [AllocPolicy::NormalOnly, AllocPolicy::HugeFirst, AllocPolicy::HugeOnly] {
        let err = mem.alloc_device(usize::MAX, policy).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfResources);
    }
    assert_eq!(mem.alloc_host(usize::MAX).unwrap_err().kind(), ErrorKind::OutOfResources);

    mem.set(small, 0x5A, 16).unwrap();
    let other = mem.alloc_device(16, AllocPolicy::NormalOnly).unwrap();
    mem.free(other).unwrap();
    mem.free(small).unwrap();
}

// ── Devices ────────────────────────────────────────────────────

#[test]
fn test_offline_device_is_unavailable() {
    let mut config = RuntimeConfig::with_devices(2);
    config.devices[1].online = false;
    let rt = Runtime::new(config).unwrap();

    assert_eq!(rt.devices().count(), 2);
    assert_eq!(rt.devices().activate(1).unwrap_err().kind(), ErrorKind::DeviceUnavailable);
    assert_eq!(rt.contexts().create(1).unwrap_err().kind(), ErrorKind::DeviceUnavailable);
    assert_eq!(rt.devices().activate(7).unwrap_err().kind(), ErrorKind::InvalidArgument);
    rt.devices().activate(0).unwrap();
    assert_eq!(rt.devices().current_device().unwrap(), 0);
}

#[test]
fn test_properties_track_memory_and_load() {
    let rt = runtime();
    rt.contexts().create(0).unwrap();
    let before = rt.devices().properties(0).unwrap();
    assert_eq!(before.total_cmm_memory, before.free_cmm_memory);

    rt.engine().init(VNpuKind::Disable).unwrap();
    let model = rt.engine().load_from_memory(&tiny_image()).unwrap();
    let after = rt.devices().properties(0).unwrap();
    assert!(after.free_cmm_memory < before.free_cmm_memory);
    assert!(after.free_sys_memory < before.free_sys_memory);

    rt.engine().unload(model).unwrap();
    let unloaded = rt.devices().properties(0).unwrap();
    assert_eq!(unloaded.free_cmm_memory, before.free_cmm_memory);
    assert_eq!(unloaded.free_sys_memory, before.free_sys_memory);
}

#[test]
fn test_reset_cascades_to_every_dependent() {
    let rt = latency_runtime();
    let ctx = rt.contexts().create(0).unwrap();
    let default = rt.contexts().get_or_create_default(0).unwrap();
    let engine = rt.engine();
    engine.init(VNpuKind::Disable).unwrap();

    let model = engine.load_from_memory(&copy_image(30_000)).unwrap();
    let info = engine.get_io_info(model).unwrap();
    let set = engine.create_io(info).unwrap();
    let x = device_with(&rt, &pattern(16));
    let y = rt.memory().alloc_device(16, AllocPolicy::NormalOnly).unwrap();
    engine.bind_input(set, 0, x, 16).unwrap();
    engine.bind_output(set, 0, y, 16).unwrap();
    let exec = engine.create_context(model).unwrap();
    let stream = rt.streams().create(ctx).unwrap();
    engine.execute_async(model, exec, 0, set, stream).unwrap();
    engine.execute_async(model, exec, 0, set, stream).unwrap();

    rt.reset_device(0).unwrap();

    assert!(!rt.devices().is_active(0));
    assert_eq!(rt.streams().count(), 0);
    assert_eq!(rt.streams().wait(stream).unwrap_err().kind(), ErrorKind::InvalidHandle);
    assert_eq!(engine.model_state(model).unwrap_err().kind(), ErrorKind::InvalidHandle);
    assert_eq!(engine.num_outputs(info).unwrap_err().kind(), ErrorKind::InvalidHandle);
    assert_eq!(rt.contexts().count(), 0);
    assert_eq!(rt.contexts().device_of(default).unwrap_err().kind(), ErrorKind::InvalidHandle);
    assert!(rt.contexts().get_current().is_err());
    assert_eq!(rt.memory().free(x).unwrap_err().kind(), ErrorKind::InvalidArgument);
    assert_eq!(rt.memory().device_usage(0).unwrap().live(), 0);
    assert_eq!(rt.devices().current_device().unwrap_err().kind(), ErrorKind::InvalidState);

    // The device comes back clean.
    let fresh = rt.contexts().create(0).unwrap();
    assert_ne!(fresh, ctx);
    assert_ne!(rt.contexts().get_or_create_default(0).unwrap(), default);
}

#[test]
fn test_finalize_unloads_models() {
    let rt = runtime();
    rt.contexts().create(0).unwrap();
    let engine = rt.engine();
    engine.init(VNpuKind::Enable).unwrap();
    let model = engine.load_from_memory(&tiny_image()).unwrap();

    engine.finalize().unwrap();
    assert!(engine.models().is_empty());
    assert_eq!(engine.model_state(model).unwrap_err().kind(), ErrorKind::InvalidHandle);
    engine.init(VNpuKind::LittleBig).unwrap();
    assert_eq!(engine.vnpu_kind().unwrap(), VNpuKind::LittleBig);
}

#[test]
fn test_error_codes_are_stable() {
    let rt = runtime();
    let ok: Result<(), _> = rt.devices().activate(0);
    assert_eq!(ErrorKind::code_of(&ok), 0);
    let err = rt.contexts().destroy(npu_runtime::ContextHandle::NULL);
    assert_eq!(ErrorKind::code_of(&err), 2);
    assert_eq!(ErrorKind::from_code(8), Some(ErrorKind::Timeout));
}
