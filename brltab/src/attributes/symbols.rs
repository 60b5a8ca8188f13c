//! Names accepted for the bits of a screen attribute.

/// Every bit has a semantic name, a decimal bit-number alias and a hex alias.
const SYMBOLS: [(&str, u8); 24] = [
    ("fg-blue", 0x01),
    ("fg-green", 0x02),
    ("fg-red", 0x04),
    ("fg-bright", 0x08),
    ("bg-blue", 0x10),
    ("bg-green", 0x20),
    ("bg-red", 0x40),
    ("blink", 0x80),
    ("bit0", 0x01),
    ("bit1", 0x02),
    ("bit2", 0x04),
    ("bit3", 0x08),
    ("bit4", 0x10),
    ("bit5", 0x20),
    ("bit6", 0x40),
    ("bit7", 0x80),
    ("bit01", 0x01),
    ("bit02", 0x02),
    ("bit04", 0x04),
    ("bit08", 0x08),
    ("bit10", 0x10),
    ("bit20", 0x20),
    ("bit40", 0x40),
    ("bit80", 0x80),
];

pub fn attribute_bit(name: &str) -> Option<u8> {
    SYMBOLS
        .iter()
        .find(|(symbol, _)| *symbol == name)
        .map(|(_, bit)| *bit)
}

pub fn symbols() -> impl Iterator<Item = (&'static str, u8)> {
    SYMBOLS.iter().copied()
}
