use std::fmt;

use rust_decimal::Decimal;

/// Money is an exact decimal. Binary floating point never touches a balance.
pub type Amount = Decimal;

/// Parse a decimal string into an exact amount.
/// Example: "50.00" -> 50.00, "12.5" -> 12.5, "100" -> 100
///
/// Scale is preserved as written, so "30.00" stays "30.00" when stored.
/// Text that cannot be held without rounding is rejected.
pub fn parse_amount(input: &str) -> Result<Amount, ParseAmountError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ParseAmountError::Empty);
    }
    let mut amount = Decimal::from_str_exact(input)
        .map_err(|_| ParseAmountError::InvalidFormat(input.to_string()))?;
    if amount.is_zero() {
        // "-0" is zero.
        amount.set_sign_positive(true);
    }
    Ok(amount)
}

/// Parse a transfer amount. Must be strictly positive.
pub fn parse_transfer_amount(input: &str) -> Result<Amount, ParseAmountError> {
    let amount = parse_amount(input)?;
    if amount <= Decimal::ZERO {
        return Err(ParseAmountError::NotPositive(amount));
    }
    Ok(amount)
}

/// Parse an opening balance. Zero is allowed, negative is not.
pub fn parse_balance(input: &str) -> Result<Amount, ParseAmountError> {
    let balance = parse_amount(input)?;
    if balance < Decimal::ZERO {
        return Err(ParseAmountError::Negative(balance));
    }
    Ok(balance)
}

/// `a + b` without rounding. `None` if the exact sum does not fit.
///
/// `Decimal` arithmetic drops fractional digits instead of failing once a
/// result outgrows 96 bits. An exact sum keeps the larger operand scale.
pub fn exact_add(a: Amount, b: Amount) -> Option<Amount> {
    let sum = a.checked_add(b)?;
    (sum.scale() >= a.scale().max(b.scale())).then_some(sum)
}

/// `a - b` without rounding. `None` if the exact difference does not fit.
pub fn exact_sub(a: Amount, b: Amount) -> Option<Amount> {
    let difference = a.checked_sub(b)?;
    (difference.scale() >= a.scale().max(b.scale())).then_some(difference)
}

/// Sum a set of amounts exactly. Returns `None` on overflow or lost precision.
pub fn checked_total<I>(amounts: I) -> Option<Amount>
where
    I: IntoIterator<Item = Amount>,
{
    amounts
        .into_iter()
        .try_fold(Decimal::ZERO, exact_add)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseAmountError {
    Empty,
    InvalidFormat(String),
    Negative(Amount),
    NotPositive(Amount),
}

impl fmt::Display for ParseAmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseAmountError::Empty => write!(f, "amount is empty"),
            ParseAmountError::InvalidFormat(input) => {
                write!(f, "'{}' is not a valid decimal amount", input)
            }
            ParseAmountError::Negative(amount) => write!(f, "{} is negative", amount),
            ParseAmountError::NotPositive(amount) => {
                write!(f, "{} is not a positive amount", amount)
            }
        }
    }
}

impl std::error::Error for ParseAmountError {}
