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

//! Pure calculators deriving display state from raw contract values.
//! Nothing here touches the network; every function is deterministic in
//! its inputs so the render layer stays trivially testable.
use num_bigint::BigUint;

use crate::{
    token::TokenMeta,
    util::{decode_base10, encode_base10},
    vesting::VestingSchedule,
};

/// Calendar units used when rendering durations. A year is 365 days and a
/// month 30 days; the remainder cascades down.
const SECS_YEAR: u64 = 365 * 24 * 60 * 60;
const SECS_MONTH: u64 = 30 * 24 * 60 * 60;
const SECS_DAY: u64 = 24 * 60 * 60;
const SECS_HOUR: u64 = 60 * 60;
const SECS_MINUTE: u64 = 60;

/// Where a vesting schedule stands right now. Revocation takes precedence
/// over every time-derived state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VestingStatus {
    /// The start time lies in the future
    Pending,
    /// Started, but the cliff has not lifted yet
    InCliff,
    /// Past the cliff, tokens unlocking linearly
    Vesting,
    /// The full duration has elapsed
    FullyVested,
    /// The owner revoked the schedule
    Revoked,
}

impl std::fmt::Display for VestingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::InCliff => write!(f, "In cliff"),
            Self::Vesting => write!(f, "Vesting"),
            Self::FullyVested => write!(f, "Fully vested"),
            Self::Revoked => write!(f, "Revoked"),
        }
    }
}

/// Whether a spending approval must precede an action, decided from the
/// currently known allowance. `Unknown` blocks submission: skipping an
/// approval on a guess would get the action reverted on-chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Approval {
    /// Allowance covers the amount; carries the parsed raw amount
    NotRequired { amount: BigUint },
    /// Allowance falls short; carries the parsed raw amount to approve
    Required { amount: BigUint },
    /// Allowance, decimals or the amount itself are not known yet
    Unknown,
}

/// Render a duration in seconds as human-readable calendar units,
/// omitting zero components.
pub fn format_duration(secs: u64) -> String {
    if secs == 0 {
        return "0 seconds".to_string()
    }

    let units = [
        (SECS_YEAR, "year"),
        (SECS_MONTH, "month"),
        (SECS_DAY, "day"),
        (SECS_HOUR, "hour"),
        (SECS_MINUTE, "minute"),
        (1, "second"),
    ];

    let mut remainder = secs;
    let mut parts = vec![];
    for (unit_secs, name) in units {
        let count = remainder / unit_secs;
        remainder %= unit_secs;
        if count == 0 {
            continue
        }
        if count == 1 {
            parts.push(format!("1 {name}"));
        } else {
            parts.push(format!("{count} {name}s"));
        }
    }

    parts.join(", ")
}

/// Percentage of the vesting duration that has elapsed, floored and
/// clamped to 0..=100. Revocation freezes the clock at the revocation
/// time.
pub fn vesting_progress_percent(schedule: &VestingSchedule, now: u64) -> u8 {
    let now = if schedule.is_revoked() { schedule.revoked_at.min(now) } else { now };

    if now <= schedule.start_time {
        return 0
    }
    if schedule.vesting_duration == 0 {
        return 100
    }

    let elapsed = now - schedule.start_time;
    let percent = (elapsed as u128 * 100) / schedule.vesting_duration as u128;
    percent.min(100) as u8
}

/// Current status of a vesting schedule.
pub fn schedule_status(schedule: &VestingSchedule, now: u64) -> VestingStatus {
    if schedule.is_revoked() {
        return VestingStatus::Revoked
    }
    if now < schedule.start_time {
        return VestingStatus::Pending
    }
    if now < schedule.cliff_time() {
        return VestingStatus::InCliff
    }
    if now < schedule.end_time() {
        return VestingStatus::Vesting
    }
    VestingStatus::FullyVested
}

/// Whether the beneficiary can claim right now. A revoked schedule is
/// never claimable, regardless of what has vested.
pub fn is_claimable(schedule: &VestingSchedule, vested: &BigUint) -> bool {
    !schedule.is_revoked() && *vested > BigUint::from(0_u32)
}

/// Decide whether a spending approval is needed before moving `requested`
/// tokens. The requested amount is the user's decimal string; it is scaled
/// by the token decimals before comparing against the raw allowance.
pub fn needs_approval(
    allowance: Option<&BigUint>,
    requested: &str,
    decimals: Option<u32>,
) -> Approval {
    let (Some(allowance), Some(decimals)) = (allowance, decimals) else { return Approval::Unknown };

    let Ok(amount) = decode_base10(requested, decimals, true) else { return Approval::Unknown };

    if *allowance >= amount {
        Approval::NotRequired { amount }
    } else {
        Approval::Required { amount }
    }
}

/// Boost multiplier in basis points for a stake held `elapsed` seconds,
/// against the pool's three duration thresholds. Base is 1x (10000 bps),
/// tiers add 25% each up to 2x.
pub fn boost_multiplier_bps(elapsed: u64, thresholds: &[u64; 3]) -> u64 {
    if elapsed >= thresholds[2] {
        20000
    } else if elapsed >= thresholds[1] {
        15000
    } else if elapsed >= thresholds[0] {
        12500
    } else {
        10000
    }
}

/// Render a basis-points multiplier as a human factor, e.g. "1.25x".
pub fn format_multiplier_bps(bps: u64) -> String {
    let int = bps / 10000;
    let frac = bps % 10000;
    if frac == 0 {
        return format!("{int}x")
    }
    let frac = format!("{frac:04}");
    format!("{int}.{}x", frac.trim_end_matches('0'))
}

/// Render a raw token amount using the token's metadata. Unknown decimals
/// degrade to the raw integer, unknown symbol to no suffix; the row is
/// never hidden over missing metadata.
pub fn format_amount(amount: &BigUint, meta: &TokenMeta) -> String {
    let rendered = match meta.decimals {
        Some(decimals) => encode_base10(amount, decimals),
        None => format!("{} (raw)", amount.to_str_radix(10)),
    };
    match &meta.symbol {
        Some(symbol) => format!("{rendered} {symbol}"),
        None => rendered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;

    fn schedule(start: u64, cliff: u64, duration: u64, revoked_at: u64) -> VestingSchedule {
        VestingSchedule {
            token: Address([3u8; 32]),
            start_time: start,
            cliff_duration: cliff,
            vesting_duration: duration,
            total_amount: BigUint::from(1000_u32),
            amount_claimed: BigUint::from(0_u32),
            revoked_at,
        }
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(0), "0 seconds");
        assert_eq!(format_duration(1), "1 second");
        assert_eq!(format_duration(90), "1 minute, 30 seconds");
        assert_eq!(format_duration(3600), "1 hour");
        assert_eq!(format_duration(31536000), "1 year");
        assert_eq!(format_duration(90061), "1 day, 1 hour, 1 minute, 1 second");
        // No stray zero components
        assert_eq!(format_duration(SECS_YEAR + 2 * SECS_MONTH), "1 year, 2 months");
        assert_eq!(format_duration(45 * SECS_DAY), "1 month, 15 days");
    }

    #[test]
    fn progress_is_clamped_and_monotonic() {
        let sched = schedule(1000, 500, 2000, 0);
        assert_eq!(vesting_progress_percent(&sched, 0), 0);
        assert_eq!(vesting_progress_percent(&sched, 1000), 0);
        assert_eq!(vesting_progress_percent(&sched, 1500), 25);
        assert_eq!(vesting_progress_percent(&sched, 2000), 50);
        assert_eq!(vesting_progress_percent(&sched, 3000), 100);
        assert_eq!(vesting_progress_percent(&sched, 1_000_000), 100);

        let mut last = 0;
        for now in (0..4000).step_by(7) {
            let p = vesting_progress_percent(&sched, now);
            assert!(p >= last);
            last = p;
        }
    }

    #[test]
    fn status_follows_the_clock() {
        let sched = schedule(1000, 500, 2000, 0);
        assert_eq!(schedule_status(&sched, 999), VestingStatus::Pending);
        assert_eq!(schedule_status(&sched, 1000), VestingStatus::InCliff);
        assert_eq!(schedule_status(&sched, 1499), VestingStatus::InCliff);
        assert_eq!(schedule_status(&sched, 1500), VestingStatus::Vesting);
        assert_eq!(schedule_status(&sched, 2999), VestingStatus::Vesting);
        assert_eq!(schedule_status(&sched, 3000), VestingStatus::FullyVested);
        assert_eq!(schedule_status(&sched, 3001), VestingStatus::FullyVested);
    }

    #[test]
    fn revocation_takes_precedence() {
        let sched = schedule(1000, 500, 2000, 1700);
        // Revoked wins at any clock reading, even past the end
        assert_eq!(schedule_status(&sched, 500), VestingStatus::Revoked);
        assert_eq!(schedule_status(&sched, 2000), VestingStatus::Revoked);
        assert_eq!(schedule_status(&sched, 10000), VestingStatus::Revoked);
        // And freezes the progress clock at the revocation time
        assert_eq!(vesting_progress_percent(&sched, 10000), 35);
    }

    #[test]
    fn claimability() {
        let live = schedule(1000, 500, 2000, 0);
        assert!(is_claimable(&live, &BigUint::from(1_u32)));
        assert!(!is_claimable(&live, &BigUint::from(0_u32)));

        let revoked = schedule(1000, 500, 2000, 1700);
        assert!(!is_claimable(&revoked, &BigUint::from(500_u32)));
    }

    #[test]
    fn approval_gating() {
        let allowance = BigUint::from(100_u64) * BigUint::from(10_u64).pow(18);

        // Allowance of 100 tokens at 18 decimals
        match needs_approval(Some(&allowance), "50", Some(18)) {
            Approval::NotRequired { amount } => {
                assert_eq!(amount, BigUint::from(50_u64) * BigUint::from(10_u64).pow(18))
            }
            x => panic!("expected NotRequired, got {x:?}"),
        }
        assert!(matches!(needs_approval(Some(&allowance), "100", Some(18)), Approval::NotRequired { .. }));
        assert!(matches!(needs_approval(Some(&allowance), "100.000000000000000001", Some(18)), Approval::Required { .. }));
        assert!(matches!(needs_approval(Some(&allowance), "150", Some(18)), Approval::Required { .. }));

        // Anything not yet known blocks the decision
        assert_eq!(needs_approval(None, "50", Some(18)), Approval::Unknown);
        assert_eq!(needs_approval(Some(&allowance), "50", None), Approval::Unknown);
        assert_eq!(needs_approval(Some(&allowance), "fifty", Some(18)), Approval::Unknown);

        // Raw allowance of 100 at 18 decimals covers exactly 1e-16 tokens
        let raw = BigUint::from(100_u32);
        assert!(matches!(
            needs_approval(Some(&raw), "0.0000000000000001", Some(18)),
            Approval::NotRequired { .. }
        ));
        assert!(matches!(needs_approval(Some(&raw), "200", Some(18)), Approval::Required { .. }));
    }

    #[test]
    fn boost_tiers() {
        let thresholds = [100, 200, 300];
        assert_eq!(boost_multiplier_bps(0, &thresholds), 10000);
        assert_eq!(boost_multiplier_bps(99, &thresholds), 10000);
        assert_eq!(boost_multiplier_bps(100, &thresholds), 12500);
        assert_eq!(boost_multiplier_bps(250, &thresholds), 15000);
        assert_eq!(boost_multiplier_bps(300, &thresholds), 20000);
        assert_eq!(boost_multiplier_bps(u64::MAX, &thresholds), 20000);
    }

    #[test]
    fn multiplier_rendering() {
        assert_eq!(format_multiplier_bps(10000), "1x");
        assert_eq!(format_multiplier_bps(12500), "1.25x");
        assert_eq!(format_multiplier_bps(15000), "1.5x");
        assert_eq!(format_multiplier_bps(20000), "2x");
    }

    #[test]
    fn amount_rendering_degrades() {
        let amount = BigUint::from(1337_u32) * BigUint::from(10_u64).pow(16);
        let full = TokenMeta {
            name: Some("Sprout".to_string()),
            symbol: Some("SPRT".to_string()),
            decimals: Some(18),
        };
        assert_eq!(format_amount(&amount, &full), "13.37 SPRT");

        let no_symbol = TokenMeta { symbol: None, ..full.clone() };
        assert_eq!(format_amount(&amount, &no_symbol), "13.37");

        let no_decimals = TokenMeta { decimals: None, ..full };
        assert_eq!(format_amount(&amount, &no_decimals), "13370000000000000000 (raw) SPRT");

        assert_eq!(format_amount(&amount, &TokenMeta::default()), "13370000000000000000 (raw)");
    }
}
