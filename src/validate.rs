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

//! Input validation for user-supplied forms. Validation happens before
//! any signing: a form that fails here never reaches a signer daemon.
//!
//! Empty required fields make a form incomplete, which blocks submission
//! without shouting an error at a field the user simply has not filled in
//! yet. Filled-but-wrong fields produce per-field errors.
use std::str::FromStr;

use num_bigint::BigUint;

use crate::{address::Address, util::decode_base10};

/// Most tokens use 18 decimals; amounts with more fractional digits than
/// that cannot be represented on-chain.
const MAX_FRACTION_DIGITS: u32 = 18;

/// Form fields an error can point at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    Beneficiary,
    Token,
    Amount,
    StartTime,
    CliffTime,
    EndTime,
    WhitelistAddress,
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Beneficiary => write!(f, "beneficiary"),
            Self::Token => write!(f, "token"),
            Self::Amount => write!(f, "amount"),
            Self::StartTime => write!(f, "start time"),
            Self::CliffTime => write!(f, "cliff time"),
            Self::EndTime => write!(f, "end time"),
            Self::WhitelistAddress => write!(f, "address"),
        }
    }
}

/// Outcome of validating a form. Submission is allowed only when the form
/// is complete and error-free.
#[derive(Clone, Debug, Default)]
pub struct ValidationReport {
    /// Per-field errors for filled-but-invalid inputs
    pub errors: Vec<(Field, String)>,
    /// Whether a required field is still empty
    pub incomplete: bool,
}

impl ValidationReport {
    pub fn submittable(&self) -> bool {
        self.errors.is_empty() && !self.incomplete
    }

    fn push(&mut self, field: Field, msg: impl Into<String>) {
        self.errors.push((field, msg.into()));
    }

    /// Validate an address field. Empty marks the form incomplete,
    /// malformed input gets an error. Returns the parsed address when
    /// valid.
    fn check_address(&mut self, field: Field, input: &str) -> Option<Address> {
        let input = input.trim();
        if input.is_empty() {
            self.incomplete = true;
            return None
        }
        match Address::from_str(input) {
            Ok(addr) => Some(addr),
            Err(_) => {
                self.push(field, "Not a valid address");
                None
            }
        }
    }

    /// Validate an amount field against the known balance, when one is
    /// known. An unknown balance skips the balance check rather than
    /// blocking input.
    fn check_amount(
        &mut self,
        field: Field,
        input: &str,
        decimals: Option<u32>,
        max_balance: Option<&BigUint>,
    ) {
        let input = input.trim();
        if input.is_empty() {
            self.incomplete = true;
            return
        }

        let decimals = decimals.unwrap_or(MAX_FRACTION_DIGITS);
        let amount = match decode_base10(input, decimals, true) {
            Ok(amount) => amount,
            Err(_) => {
                self.push(field, "Not a valid positive amount");
                return
            }
        };

        if amount == BigUint::from(0_u32) {
            self.push(field, "Amount must be greater than zero");
            return
        }

        if let Some(max) = max_balance {
            if amount > *max {
                self.push(field, "Amount exceeds available balance");
            }
        }
    }
}

/// Form for creating a vesting schedule. Times are absolute UNIX
/// timestamps as entered; the contract wants durations, which the
/// accessors derive.
#[derive(Clone, Debug, Default)]
pub struct ScheduleForm {
    pub beneficiary: String,
    pub token: String,
    pub amount: String,
    pub start_time: Option<u64>,
    pub cliff_time: Option<u64>,
    pub end_time: Option<u64>,
}

impl ScheduleForm {
    /// Validate the whole form against the wall clock and the creator's
    /// known token balance.
    pub fn validate(
        &self,
        now: u64,
        decimals: Option<u32>,
        max_balance: Option<&BigUint>,
    ) -> ValidationReport {
        let mut report = ValidationReport::default();

        report.check_address(Field::Beneficiary, &self.beneficiary);
        report.check_address(Field::Token, &self.token);
        report.check_amount(Field::Amount, &self.amount, decimals, max_balance);

        let (Some(start), Some(cliff), Some(end)) =
            (self.start_time, self.cliff_time, self.end_time)
        else {
            report.incomplete = true;
            return report
        };

        if start <= now {
            report.push(Field::StartTime, "Start time must lie in the future");
        }
        if cliff < start {
            report.push(Field::CliffTime, "Cliff time must not precede the start time");
        }
        if end <= cliff {
            report.push(Field::EndTime, "End time must come after the cliff time");
        }

        report
    }

    /// Seconds from start until the cliff lifts.
    pub fn cliff_duration(&self) -> Option<u64> {
        Some(self.cliff_time?.checked_sub(self.start_time?)?)
    }

    /// Seconds from start until fully vested.
    pub fn vesting_duration(&self) -> Option<u64> {
        Some(self.end_time?.checked_sub(self.start_time?)?)
    }
}

/// Form for staking or withdrawing LP tokens.
#[derive(Clone, Debug, Default)]
pub struct StakeForm {
    pub amount: String,
}

impl StakeForm {
    pub fn validate(&self, decimals: Option<u32>, max_balance: Option<&BigUint>) -> ValidationReport {
        let mut report = ValidationReport::default();
        report.check_amount(Field::Amount, &self.amount, decimals, max_balance);
        report
    }
}

/// Form for whitelist management. The contract state decides which
/// direction makes sense: adding an address that is already whitelisted,
/// or removing one that is not, is rejected before any signing.
#[derive(Clone, Debug, Default)]
pub struct WhitelistForm {
    pub address: String,
}

impl WhitelistForm {
    pub fn validate(&self, adding: bool, already_whitelisted: Option<bool>) -> ValidationReport {
        let mut report = ValidationReport::default();
        report.check_address(Field::WhitelistAddress, &self.address);

        match (adding, already_whitelisted) {
            (true, Some(true)) => report.push(
                Field::WhitelistAddress,
                "Address is already whitelisted, remove it instead",
            ),
            (false, Some(false)) => report.push(
                Field::WhitelistAddress,
                "Address is not whitelisted, add it instead",
            ),
            _ => (),
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;

    fn addr(byte: u8) -> String {
        Address([byte; 32]).to_string()
    }

    fn filled_form() -> ScheduleForm {
        ScheduleForm {
            beneficiary: addr(1),
            token: addr(2),
            amount: "100".to_string(),
            start_time: Some(2000),
            cliff_time: Some(2500),
            end_time: Some(4000),
        }
    }

    #[test]
    fn valid_form_is_submittable() {
        let report = filled_form().validate(1000, Some(18), None);
        assert!(report.submittable());
    }

    #[test]
    fn empty_fields_block_without_errors() {
        let form = ScheduleForm::default();
        let report = form.validate(1000, Some(18), None);
        assert!(!report.submittable());
        assert!(report.incomplete);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn malformed_address_is_an_error() {
        let mut form = filled_form();
        form.beneficiary = "not-an-address".to_string();
        let report = form.validate(1000, Some(18), None);
        assert!(!report.submittable());
        assert!(report.errors.iter().any(|(f, _)| *f == Field::Beneficiary));
    }

    #[test]
    fn amounts_must_be_positive_and_within_balance() {
        let mut form = filled_form();

        form.amount = "0".to_string();
        assert!(!form.validate(1000, Some(18), None).submittable());

        form.amount = "-5".to_string();
        assert!(!form.validate(1000, Some(18), None).submittable());

        // 19 fractional digits at 18 decimals
        form.amount = "1.0000000000000000001".to_string();
        assert!(!form.validate(1000, Some(18), None).submittable());

        // Balance check applies only when the balance is known
        form.amount = "100".to_string();
        let balance = BigUint::from(50_u64) * BigUint::from(10_u64).pow(18);
        let report = form.validate(1000, Some(18), Some(&balance));
        assert!(report.errors.iter().any(|(f, _)| *f == Field::Amount));
        assert!(form.validate(1000, Some(18), None).submittable());
    }

    #[test]
    fn date_ordering_is_enforced() {
        let now = 1000;

        // Start in the past
        let mut form = filled_form();
        form.start_time = Some(500);
        assert!(form.validate(now, Some(18), None).errors.iter().any(|(f, _)| *f == Field::StartTime));

        // Cliff before start
        let mut form = filled_form();
        form.cliff_time = Some(1500);
        assert!(form.validate(now, Some(18), None).errors.iter().any(|(f, _)| *f == Field::CliffTime));

        // End not after cliff
        let mut form = filled_form();
        form.end_time = Some(2500);
        assert!(form.validate(now, Some(18), None).errors.iter().any(|(f, _)| *f == Field::EndTime));

        // Cliff equal to start is allowed (no cliff)
        let mut form = filled_form();
        form.cliff_time = form.start_time;
        assert!(form.validate(now, Some(18), None).submittable());
    }

    #[test]
    fn duration_conversions() {
        let form = filled_form();
        assert_eq!(form.cliff_duration(), Some(500));
        assert_eq!(form.vesting_duration(), Some(2000));
        assert_eq!(ScheduleForm::default().cliff_duration(), None);
    }

    #[test]
    fn whitelist_direction_rules() {
        let form = WhitelistForm { address: addr(5) };

        assert!(form.validate(true, Some(false)).submittable());
        assert!(form.validate(false, Some(true)).submittable());
        assert!(!form.validate(true, Some(true)).submittable());
        assert!(!form.validate(false, Some(false)).submittable());

        // Unknown membership does not block, the contract is authoritative
        assert!(form.validate(true, None).submittable());
    }
}
