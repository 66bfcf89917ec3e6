// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Stable 64-bit string identities for asset paths and material slot names.

/// Hashes a string to a stable 64-bit identity.
///
/// The value is the first eight bytes (little-endian) of the BLAKE3 digest,
/// so it is identical across runs and platforms and can be baked into asset
/// files by exporters.
pub fn str_hash64(s: &str) -> u64 {
    let digest = blake3::hash(s.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}
