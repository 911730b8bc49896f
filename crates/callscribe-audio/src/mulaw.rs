//! ITU-T G.711 mu-law codec.

const BIAS: i32 = 0x84;
const CLIP: i32 = 32635;

/// Linear value of every mu-law byte, built at compile time.
pub const MULAW_DECODE_TABLE: [i16; 256] = build_decode_table();

const fn decode(byte: u8) -> i16 {
    let u = !byte;
    let mut t = (((u & 0x0F) as i32) << 3) + BIAS;
    t <<= ((u & 0x70) >> 4) as u32;
    if u & 0x80 != 0 {
        (BIAS - t) as i16
    } else {
        (t - BIAS) as i16
    }
}

const fn build_decode_table() -> [i16; 256] {
    let mut table = [0i16; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = decode(i as u8);
        i += 1;
    }
    table
}

#[inline]
pub fn decode_sample(byte: u8) -> i16 {
    MULAW_DECODE_TABLE[byte as usize]
}

/// Decode `input` into `output`, one sample per byte.
pub fn decode_into(input: &[u8], output: &mut Vec<i16>) {
    output.clear();
    output.extend(input.iter().map(|&b| decode_sample(b)));
}

/// Encode a linear sample to mu-law.
pub fn encode_sample(sample: i16) -> u8 {
    let mut s = sample as i32;
    let sign = if s < 0 {
        s = -s;
        0x80
    } else {
        0
    };
    s = s.min(CLIP) + BIAS;

    let mut exponent = 7;
    let mut mask = 0x4000;
    while s & mask == 0 && exponent > 0 {
        exponent -= 1;
        mask >>= 1;
    }
    let mantissa = (s >> (exponent + 3)) & 0x0F;
    !((sign | (exponent << 4) | mantissa) as u8)
}
