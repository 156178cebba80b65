// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The declared input/output contract of a model.
//!
//! Index lookup is canonical. Name lookup resolves through a map built once
//! when the contract is constructed.

use crate::ModelManifest;
use std::collections::HashMap;
use tensor_meta::TensorDesc;

/// Input or output side of the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only description of a model's IO tensors.
#[derive(Debug, Clone)]
pub struct IoContract {
    inputs: Vec<TensorDesc>,
    outputs: Vec<TensorDesc>,
    input_names: HashMap<String, usize>,
    output_names: HashMap<String, usize>,
    num_groups: usize,
}

impl IoContract {
    /// Builds the contract from a validated manifest.
    pub fn from_manifest(manifest: &ModelManifest) -> Self {
        let to_desc = |(index, t): (usize, &crate::ManifestTensor)| TensorDesc {
            name: t.name.clone(),
            index,
            dtype: t.dtype,
            layout: t.layout,
            batch_variable: t.batch_variable,
            shapes: t.shape_groups.clone(),
        };
        let inputs: Vec<TensorDesc> = manifest.inputs.iter().enumerate().map(to_desc).collect();
        let outputs: Vec<TensorDesc> = manifest.outputs.iter().enumerate().map(to_desc).collect();

        Self {
            input_names: name_map(&inputs),
            output_names: name_map(&outputs),
            inputs,
            outputs,
            num_groups: manifest.num_groups(),
        }
    }

    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    pub fn num_groups(&self) -> usize {
        self.num_groups
    }

    /// Returns every tensor on one side, in index order.
    pub fn tensors(&self, dir: Direction) -> &[TensorDesc] {
        match dir {
            Direction::Input => &self.inputs,
            Direction::Output => &self.outputs,
        }
    }

    pub fn tensor(&self, dir: Direction, index: usize) -> Option<&TensorDesc> {
        self.tensors(dir).get(index)
    }

    pub fn index_of(&self, dir: Direction, name: &str) -> Option<usize> {
        let names = match dir {
            Direction::Input => &self.input_names,
            Direction::Output => &self.output_names,
        };
        names.get(name).copied()
    }

    pub fn tensor_by_name(&self, dir: Direction, name: &str) -> Option<&TensorDesc> {
        self.index_of(dir, name).and_then(|i| self.tensor(dir, i))
    }

    pub fn num_tensors(&self) -> usize {
        self.inputs.len() + self.outputs.len()
    }
}

fn name_map(tensors: &[TensorDesc]) -> HashMap<String, usize> {
    tensors
        .iter()
        .map(|t| (t.name.clone(), t.index))
        .collect()
}
