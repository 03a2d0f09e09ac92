// Copyright (c) 2026 Credence
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]

use anyhow::Result;
use credence::core::security::keystore::FileKeyBackend;
use credence::core::security::signer::SignerBackend;
use std::path::PathBuf;

fn main() -> Result<()> {
    let out_dir = std::env::args().nth(1).unwrap_or_else(|| "data".to_string());
    let mut key_path = PathBuf::from(out_dir);
    std::fs::create_dir_all(&key_path)?;
    key_path.push("operator.key");

    // Creates the key if absent (encrypted at rest when
    // CREDENCE_KEY_PASSPHRASE is set); reuses it otherwise.
    let backend = FileKeyBackend::load_or_create(&key_path)?;
    println!("{}", backend.address());
    Ok(())
}
