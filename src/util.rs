/* This file is part of sprout
 *
 * Copyright (C) 2023-2026 Sprout developers
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Various utilities: fixed-point decimal parsing, timestamps, filesystem paths.
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};

use chrono::{DateTime, Utc};
use log::info;
use num_bigint::BigUint;

use crate::{error::Error, Result};

/// Decode a base-10 decimal string into an integer amount scaled by
/// `decimals`. With `strict` set, excess fractional digits are an error,
/// otherwise they are truncated.
pub fn decode_base10(amount: &str, decimals: u32, strict: bool) -> Result<BigUint> {
    let amount = amount.trim();
    if amount.is_empty() {
        return Err(Error::ParseFailed("Empty amount"))
    }
    if amount.starts_with('-') || amount.starts_with('+') {
        return Err(Error::ParseFailed("Amount must be an unsigned decimal"))
    }

    let mut parts = amount.splitn(2, '.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next().unwrap_or("");

    if int_part.is_empty() && frac_part.is_empty() {
        return Err(Error::ParseFailed("Empty amount"))
    }

    if strict && frac_part.len() > decimals as usize {
        return Err(Error::ParseFailed("Too many decimal places"))
    }

    let mut frac: String = frac_part.chars().take(decimals as usize).collect();
    while frac.len() < decimals as usize {
        frac.push('0');
    }

    let mut digits = String::with_capacity(int_part.len() + frac.len());
    digits.push_str(if int_part.is_empty() { "0" } else { int_part });
    digits.push_str(&frac);

    Ok(digits.parse::<BigUint>()?)
}

/// Encode an integer amount scaled by `decimals` into a base-10 decimal
/// string, trimming trailing fractional zeroes.
pub fn encode_base10(amount: &BigUint, decimals: u32) -> String {
    let mut digits = amount.to_str_radix(10);
    while digits.len() <= decimals as usize {
        digits.insert(0, '0');
    }
    let split = digits.len() - decimals as usize;
    let (int_part, frac_part) = digits.split_at(split);
    let frac_part = frac_part.trim_end_matches('0');

    if frac_part.is_empty() {
        int_part.to_string()
    } else {
        format!("{int_part}.{frac_part}")
    }
}

/// Current UNIX timestamp in seconds.
pub fn unix_timestamp() -> Result<u64> {
    let elapsed =
        UNIX_EPOCH.elapsed().map_err(|_| Error::ParseFailed("System clock before UNIX epoch"))?;
    Ok(elapsed.as_secs())
}

/// Render a UNIX timestamp as a human-readable UTC date. Zero renders as
/// "Not set", matching the sentinel the contracts use for unset times.
pub fn timestamp_to_date(timestamp: u64) -> String {
    if timestamp == 0 {
        return "Not set".to_string()
    }

    match DateTime::<Utc>::from_timestamp(timestamp as i64, 0) {
        Some(dt) => dt.format("%H:%M:%S %A %-d %B %Y").to_string(),
        None => "Not set".to_string(),
    }
}

/// Expand a leading tilde in the given path using `$HOME`.
pub fn expand_path(path: &str) -> Result<PathBuf> {
    if let Some(rest) = path.strip_prefix("~") {
        let Some(home) = env::var_os("HOME") else {
            return Err(Error::ParseFailed("Could not find home directory"))
        };
        let mut expanded = PathBuf::from(home);
        expanded.push(rest.trim_start_matches('/'));
        return Ok(expanded)
    }

    Ok(PathBuf::from(path))
}

/// Resolve the configuration file path: an explicit path wins, otherwise
/// the default location under `~/.config/sprout/` is used.
pub fn get_config_path(config: Option<String>, name: &str) -> Result<PathBuf> {
    match config {
        Some(path) => expand_path(&path),
        None => {
            let mut path = expand_path("~/.config/sprout")?;
            path.push(name);
            Ok(path)
        }
    }
}

/// Place the bundled default configuration at the given path if no file
/// exists there yet.
pub fn spawn_config(path: &Path, contents: &str) -> Result<()> {
    if path.exists() {
        return Ok(())
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    info!(target: "util", "Created default configuration at {}", path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base10_decoding() {
        assert_eq!(decode_base10("100", 2, true).unwrap(), BigUint::from(10000_u32));
        assert_eq!(decode_base10("13.37", 4, true).unwrap(), BigUint::from(133700_u32));
        assert_eq!(
            decode_base10("0.0000000000000001", 18, true).unwrap(),
            BigUint::from(100_u32)
        );
        assert_eq!(decode_base10("0", 18, true).unwrap(), BigUint::from(0_u32));
        assert_eq!(decode_base10(".5", 1, true).unwrap(), BigUint::from(5_u32));

        // Excess precision
        assert!(decode_base10("1.001", 2, true).is_err());
        assert_eq!(decode_base10("1.001", 2, false).unwrap(), BigUint::from(100_u32));

        // Garbage
        assert!(decode_base10("", 2, true).is_err());
        assert!(decode_base10("-5", 2, true).is_err());
        assert!(decode_base10("1.2.3", 2, true).is_err());
        assert!(decode_base10("lorem", 2, true).is_err());
    }

    #[test]
    fn base10_encoding() {
        assert_eq!(encode_base10(&BigUint::from(133700_u32), 4), "13.37");
        assert_eq!(encode_base10(&BigUint::from(10000_u32), 2), "100");
        assert_eq!(encode_base10(&BigUint::from(0_u32), 18), "0");
        assert_eq!(encode_base10(&BigUint::from(1_u32), 18), "0.000000000000000001");
    }

    #[test]
    fn base10_roundtrip_keeps_scale() {
        let amount = decode_base10("42.69", 8, true).unwrap();
        assert_eq!(encode_base10(&amount, 8), "42.69");
    }
}
