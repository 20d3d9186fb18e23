/// Parses a 7-bit I2C address written as `0x69` style hex or plain decimal.
pub fn parse_i2c_address(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    let address = parsed.map_err(|e| format!("invalid I2C address {s:?}: {e}"))?;
    if address > 0x7f {
        return Err(format!("I2C address {s:?} does not fit in 7 bits"));
    }
    Ok(address)
}
