// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! IO introspection values and binding sets.

use crate::handle::ModelId;
use crate::RuntimeError;
use model_image::{Direction, IoContract};
use npu_memory::{MemKind, MemPtr, MemoryAllocator};
use std::sync::Arc;
use tensor_meta::{DType, Layout, TensorDesc};

/// Read-only description of one tensor in one shape group.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TensorInfo {
    pub name: String,
    pub index: usize,
    pub direction: Direction,
    pub group: usize,
    pub dims: Vec<usize>,
    pub dtype: DType,
    pub layout: Layout,
    /// Buffer size in bytes for this group.
    pub size: usize,
    pub batch_variable: bool,
}

impl TensorInfo {
    pub(crate) fn from_desc(desc: &TensorDesc, direction: Direction, group: usize) -> Result<Self, RuntimeError> {
        let shape = desc.shape(group)?;
        Ok(Self {
            name: desc.name.clone(),
            index: desc.index,
            direction,
            group,
            dims: shape.dims().to_vec(),
            dtype: desc.dtype,
            layout: desc.layout,
            size: desc.size_bytes(group)?,
            batch_variable: desc.batch_variable,
        })
    }
}

/// A buffer bound to a tensor slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub ptr: MemPtr,
    pub size: usize,
}

pub(crate) struct IoInfoEntry {
    pub(crate) model: ModelId,
    pub(crate) contract: Arc<IoContract>,
}

pub(crate) struct IoSetEntry {
    pub(crate) model: ModelId,
    pub(crate) contract: Arc<IoContract>,
    pub(crate) inputs: Vec<Option<Binding>>,
    pub(crate) outputs: Vec<Option<Binding>>,
    pub(crate) batch: Option<u32>,
}

/// A binding checked against its tensor for one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ResolvedSlot {
    pub(crate) ptr: MemPtr,
    /// Bytes the NPU reads or writes for this dispatch.
    pub(crate) len: usize,
}

impl IoSetEntry {
    pub(crate) fn new(model: ModelId, contract: Arc<IoContract>) -> Self {
        Self {
            model,
            inputs: vec![None; contract.num_inputs()],
            outputs: vec![None; contract.num_outputs()],
            contract,
            batch: None,
        }
    }

    pub(crate) fn slots_mut(&mut self, dir: Direction) -> &mut [Option<Binding>] {
        match dir {
            Direction::Input => &mut self.inputs,
            Direction::Output => &mut self.outputs,
        }
    }

    pub(crate) fn slots(&self, dir: Direction) -> &[Option<Binding>] {
        match dir {
            Direction::Input => &self.inputs,
            Direction::Output => &self.outputs,
        }
    }

    pub(crate) fn bind(&mut self, dir: Direction, index: usize, binding: Binding) -> Result<(), RuntimeError> {
        if binding.ptr.is_null() {
            return Err(RuntimeError::InvalidArgument(format!(
                "cannot bind a null buffer to {dir} {index}"
            )));
        }
        let count = self.slots(dir).len();
        let slot = self.slots_mut(dir).get_mut(index).ok_or_else(|| {
            RuntimeError::InvalidArgument(format!("{dir} index {index} out of range (model has {count})"))
        })?;
        *slot = Some(binding);
        Ok(())
    }

    pub(crate) fn get(&self, dir: Direction, index: usize) -> Result<Option<Binding>, RuntimeError> {
        self.slots(dir).get(index).copied().ok_or_else(|| {
            RuntimeError::InvalidArgument(format!(
                "{dir} index {index} out of range (model has {})",
                self.slots(dir).len()
            ))
        })
    }

    /// Checks every slot for `group` and returns the byte ranges to touch.
    ///
    /// Every buffer must be live device memory on `device`. Inputs are
    /// checked before outputs, each in declaration order, so the first
    /// reported slot is deterministic.
    pub(crate) fn resolve(
        &self,
        group: usize,
        device: u32,
        allocator: &MemoryAllocator,
    ) -> Result<(Vec<ResolvedSlot>, Vec<ResolvedSlot>), RuntimeError> {
        if group >= self.contract.num_groups() {
            return Err(RuntimeError::InvalidArgument(format!(
                "shape group {group} out of range (model has {})",
                self.contract.num_groups()
            )));
        }
        let inputs = self.resolve_dir(Direction::Input, group, device, allocator)?;
        let outputs = self.resolve_dir(Direction::Output, group, device, allocator)?;
        Ok((inputs, outputs))
    }

    fn resolve_dir(
        &self,
        dir: Direction,
        group: usize,
        device: u32,
        allocator: &MemoryAllocator,
    ) -> Result<Vec<ResolvedSlot>, RuntimeError> {
        let tensors = self.contract.tensors(dir);
        let mut sizes = Vec::with_capacity(tensors.len());
        for desc in tensors {
            sizes.push(desc.effective_size(group, self.batch)?);
        }

        tensors
            .iter()
            .zip(sizes)
            .zip(self.slots(dir))
            .map(|((desc, len), slot)| {
                let incomplete = |detail: String| RuntimeError::IoBindingIncomplete {
                    direction: dir.as_str(),
                    tensor: desc.name.clone(),
                    index: desc.index,
                    detail,
                };
                let binding = (*slot).ok_or_else(|| incomplete("not bound".into()))?;
                if binding.ptr.kind() != Some(MemKind::Device(device)) {
                    let location = match binding.ptr.kind() {
                        Some(MemKind::Device(other)) => format!("device {other}"),
                        Some(_) => "host memory".to_string(),
                        None => "an unmapped address".to_string(),
                    };
                    return Err(incomplete(format!(
                        "buffer {} is in {location}, model runs on device {device}",
                        binding.ptr
                    )));
                }
                if binding.size < len {
                    return Err(incomplete(format!(
                        "bound {} bytes, tensor needs {len}",
                        binding.size
                    )));
                }
                allocator.block(binding.ptr, len).map_err(|e| {
                    incomplete(format!("buffer {} is not a live region of {len} bytes: {e}", binding.ptr))
                })?;
                Ok(ResolvedSlot {
                    ptr: binding.ptr,
                    len,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, Handle};
    use model_image::{ModelKind, ModelManifest};
    use npu_memory::{AllocPolicy, DevicePools, MemoryBudget};
    use tensor_meta::Shape;

    fn contract() -> Arc<IoContract> {
        let json = r#"{
            "name": "m", "kind": "1core",
            "inputs": [
                {"name": "a", "dtype": "uint8", "batch_variable": true, "shape_groups": [[4, 8], [2, 8]]},
                {"name": "b", "dtype": "fp32", "shape_groups": [[2], [2]]}
            ],
            "outputs": [
                {"name": "y", "dtype": "uint8", "shape_groups": [[16], [16]]}
            ]
        }"#;
        let manifest = ModelManifest::from_json(json).unwrap();
        assert_eq!(manifest.kind, ModelKind::OneCore);
        Arc::new(IoContract::from_manifest(&manifest))
    }

    fn allocator() -> MemoryAllocator {
        MemoryAllocator::new(
            MemoryBudget::from_mb(1),
            &[DevicePools {
                device: 0,
                cmm: MemoryBudget::from_mb(4),
                huge: MemoryBudget::from_mb(0),
            }],
        )
        .unwrap()
    }

    fn bound_set(mem: &MemoryAllocator) -> IoSetEntry {
        let mut set = IoSetEntry::new(ModelId::from_raw(1), contract());
        for (dir, index, size) in [
            (Direction::Input, 0, 32),
            (Direction::Input, 1, 8),
            (Direction::Output, 0, 16),
        ] {
            let ptr = mem.alloc_device(0, size, AllocPolicy::NormalOnly).unwrap();
            set.bind(dir, index, Binding { ptr, size }).unwrap();
        }
        set
    }

    #[test]
    fn test_tensor_info() {
        let c = contract();
        let info = TensorInfo::from_desc(c.tensor(Direction::Input, 1).unwrap(), Direction::Input, 0).unwrap();
        assert_eq!(info.name, "b");
        assert_eq!(info.size, 8);
        assert_eq!(info.dims, Shape::new(vec![2]).dims());
    }

    #[test]
    fn test_bind_rejects_null_and_range() {
        let mut set = IoSetEntry::new(ModelId::from_raw(1), contract());
        let ok = Binding { ptr: MemPtr::new(0x1000), size: 4 };
        assert!(set.bind(Direction::Input, 5, ok).is_err());
        let null = Binding { ptr: MemPtr::NULL, size: 4 };
        assert_eq!(set.bind(Direction::Input, 0, null).unwrap_err().kind(), ErrorKind::InvalidArgument);
        set.bind(Direction::Output, 0, ok).unwrap();
        assert_eq!(set.get(Direction::Output, 0).unwrap(), Some(ok));
        assert_eq!(set.get(Direction::Input, 0).unwrap(), None);
    }

    #[test]
    fn test_resolve_complete() {
        let mem = allocator();
        let set = bound_set(&mem);
        let (ins, outs) = set.resolve(0, 0, &mem).unwrap();
        assert_eq!(ins.iter().map(|s| s.len).collect::<Vec<_>>(), vec![32, 8]);
        assert_eq!(outs[0].len, 16);
    }

    #[test]
    fn test_resolve_unbound_and_undersized() {
        let mem = allocator();
        let mut set = bound_set(&mem);
        set.inputs[1] = None;
        let err = set.resolve(0, 0, &mem).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoBindingIncomplete);
        assert!(err.to_string().contains("'b'"));

        let mut set = bound_set(&mem);
        if let Some(b) = set.outputs[0].as_mut() {
            b.size = 15;
        }
        assert_eq!(set.resolve(0, 0, &mem).unwrap_err().kind(), ErrorKind::IoBindingIncomplete);
    }

    #[test]
    fn test_resolve_freed_buffer() {
        let mem = allocator();
        let set = bound_set(&mem);
        let out = set.outputs[0].unwrap().ptr;
        mem.free(out).unwrap();
        assert_eq!(set.resolve(0, 0, &mem).unwrap_err().kind(), ErrorKind::IoBindingIncomplete);
    }

    #[test]
    fn test_resolve_requires_memory_on_model_device() {
        let mem = allocator();
        let mut set = bound_set(&mem);
        let host = mem.alloc_host(32).unwrap();
        set.inputs[0] = Some(Binding { ptr: host, size: 32 });
        let err = set.resolve(0, 0, &mem).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoBindingIncomplete);
        assert!(err.to_string().contains("host memory"));

        let set = bound_set(&mem);
        let err = set.resolve(0, 1, &mem).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoBindingIncomplete);
        assert!(err.to_string().contains("'a'"));
    }

    #[test]
    fn test_resolve_dynamic_batch() {
        let mem = allocator();
        let mut set = bound_set(&mem);
        set.batch = Some(1);
        let (ins, _) = set.resolve(0, 0, &mem).unwrap();
        assert_eq!(ins[0].len, 8);
        // Fixed-shape tensors ignore the override.
        assert_eq!(ins[1].len, 8);

        set.batch = Some(3);
        assert_eq!(set.resolve(1, 0, &mem).unwrap_err().kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_resolve_bad_group() {
        let mem = allocator();
        let set = bound_set(&mem);
        assert_eq!(set.resolve(2, 0, &mem).unwrap_err().kind(), ErrorKind::InvalidArgument);
    }
}
