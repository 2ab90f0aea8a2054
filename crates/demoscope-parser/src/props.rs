//! Bit-level decoding of entity prop values.

use demoscope_arena::Arena;
use demoscope_bits::{bits_for, BitReader};
use demoscope_core::{
    DemoError, FloatValue, NumericInfo, PropFlags, PropKind, PropValue, SendProp,
};

/// Width of a string prop's length.
pub const STRING_LENGTH_BITS: u32 = 9;

/// Decode one value of `prop`. `names` resolves the prop name for errors.
pub fn decode_value(
    r: &mut BitReader<'_>,
    prop: &SendProp,
    names: &Arena,
) -> Result<PropValue, DemoError> {
    let value = match &prop.kind {
        PropKind::Int(info) => PropValue::Int(decode_int(r, prop.flags, info)),
        PropKind::Float(info) => PropValue::Float(decode_float(r, prop.flags, info)),
        PropKind::Vector3(info) => PropValue::Vector3(decode_vector3(r, prop, info)),
        PropKind::Vector2(info) => PropValue::Vector2([
            decode_float(r, prop.flags, info),
            decode_float(r, prop.flags, info),
        ]),
        PropKind::String(_) => {
            let len = r.read_uint(STRING_LENGTH_BITS) as usize;
            let mut bytes = vec![0u8; len];
            r.read_bytes(&mut bytes);
            PropValue::String(bytes)
        }
        PropKind::Array {
            element,
            num_elements,
        } => {
            let count = r.read_uint(bits_for(*num_elements));
            if count > *num_elements {
                return Err(DemoError::ArrayTooLong {
                    count,
                    max: *num_elements,
                });
            }
            let mut items = Vec::with_capacity(count as usize);
            for _ in 0..count {
                items.push(decode_value(r, element, names)?);
            }
            PropValue::Array(items)
        }
        PropKind::DataTable { .. } | PropKind::Exclude { .. } => {
            return Err(DemoError::NonValueProp {
                prop: String::from_utf8_lossy(prop.name.resolve(names)?).into_owned(),
            });
        }
    };
    Ok(value)
}

fn decode_int(r: &mut BitReader<'_>, flags: PropFlags, info: &NumericInfo) -> i64 {
    let bits = info.bits.min(32);
    if flags.contains(PropFlags::UNSIGNED) {
        i64::from(r.read_uint(bits))
    } else {
        i64::from(r.read_sint(bits))
    }
}

/// Decode a float, picking the encoding by flag precedence.
pub fn decode_float(r: &mut BitReader<'_>, flags: PropFlags, info: &NumericInfo) -> FloatValue {
    let bits = info.bits.min(32);
    if flags.contains(PropFlags::COORD) {
        FloatValue::Exact(r.read_bit_coord())
    } else if flags.contains(PropFlags::COORD_MP) {
        FloatValue::Exact(r.read_bit_coord_mp(false, false))
    } else if flags.contains(PropFlags::COORD_MP_LOWPRECISION) {
        FloatValue::Exact(r.read_bit_coord_mp(false, true))
    } else if flags.contains(PropFlags::COORD_MP_INTEGRAL) {
        FloatValue::Exact(r.read_bit_coord_mp(true, false))
    } else if flags.contains(PropFlags::NOSCALE) {
        FloatValue::Exact(r.read_f32())
    } else if flags.contains(PropFlags::NORMAL) {
        FloatValue::Exact(r.read_bit_normal())
    } else if flags.contains(PropFlags::CELL_COORD) {
        FloatValue::Exact(r.read_bit_cell_coord(bits, false, false))
    } else if flags.contains(PropFlags::CELL_COORD_LOWPRECISION) {
        FloatValue::Exact(r.read_bit_cell_coord(bits, false, true))
    } else if flags.contains(PropFlags::CELL_COORD_INTEGRAL) {
        FloatValue::Exact(r.read_bit_cell_coord(bits, true, false))
    } else {
        FloatValue::Quantized(r.read_uint(bits))
    }
}

fn decode_vector3(r: &mut BitReader<'_>, prop: &SendProp, info: &NumericInfo) -> [FloatValue; 3] {
    let x = decode_float(r, prop.flags, info);
    let y = decode_float(r, prop.flags, info);
    if !prop.flags.contains(PropFlags::NORMAL) {
        return [x, y, decode_float(r, prop.flags, info)];
    }

    // Unit normals send only the sign of z.
    let negative = r.read_bit();
    let (fx, fy) = (prop.to_float(x), prop.to_float(y));
    let mut z = (1.0 - fx * fx - fy * fy).max(0.0).sqrt();
    if negative {
        z = -z;
    }
    [x, y, FloatValue::Exact(z)]
}
