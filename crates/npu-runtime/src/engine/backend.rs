// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The kernel seam between the engine and whatever computes outputs.

use crate::RuntimeError;

/// One dispatch as seen by a backend.
#[derive(Debug)]
pub struct ComputeRequest<'a> {
    pub model: &'a str,
    pub group: usize,
    /// Effective bytes of each input, in declaration order.
    pub inputs: &'a [Vec<u8>],
    /// Effective size of each output, in declaration order.
    pub output_sizes: &'a [usize],
}

/// Computes a model's outputs from its inputs.
///
/// Implementations must return exactly one buffer per output, each of the
/// requested size. Anything else is treated as a fatal protocol desync and
/// invalidates the model.
pub trait ComputeBackend: Send + Sync {
    fn name(&self) -> &str;

    fn compute(&self, request: &ComputeRequest<'_>) -> Result<Vec<Vec<u8>>, RuntimeError>;
}

/// Deterministic stand-in for the NPU.
///
/// Output `k` is the concatenated input bytes repeated cyclically to fill
/// the output, or zeros when the model has no inputs.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoBackend;

impl ComputeBackend for EchoBackend {
    fn name(&self) -> &str {
        "echo"
    }

    fn compute(&self, request: &ComputeRequest<'_>) -> Result<Vec<Vec<u8>>, RuntimeError> {
        let source: Vec<u8> = request.inputs.concat();
        let outputs = request
            .output_sizes
            .iter()
            .map(|&size| {
                if source.is_empty() {
                    vec![0; size]
                } else {
                    source.iter().copied().cycle().take(size).collect()
                }
            })
            .collect();
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(inputs: &[Vec<u8>], sizes: &[usize]) -> Vec<Vec<u8>> {
        EchoBackend
            .compute(&ComputeRequest {
                model: "m",
                group: 0,
                inputs,
                output_sizes: sizes,
            })
            .unwrap()
    }

    #[test]
    fn test_echo_cycles_inputs() {
        let out = run(&[vec![1, 2], vec![3]], &[7, 2]);
        assert_eq!(out[0], vec![1, 2, 3, 1, 2, 3, 1]);
        assert_eq!(out[1], vec![1, 2]);
    }

    #[test]
    fn test_echo_without_inputs_is_zero() {
        let out = run(&[], &[4]);
        assert_eq!(out, vec![vec![0; 4]]);
    }

    #[test]
    fn test_name() {
        assert_eq!(EchoBackend.name(), "echo");
    }
}
