// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rdds developers

//! Opcode-driven deserialization: CDR bytes into sample memory.
//!
//! The target sample must be zero-initialized (or deep-freed): the walker
//! allocates owned strings, sequence buffers and external fields as it goes
//! and assumes the pointer slots it writes were empty. Wire data is fully
//! bounds-checked; structural surprises surface as `InconsistentType`,
//! oversize payloads as `SampleTooLarge`.

use super::cursor::CdrDecoder;
use super::sample::{alloc_buffer, alloc_string_bytes};
use super::serialize::find_union_case;
use super::{
    adr_next, insn_flags, insn_jump, insn_length, insn_op, insn_subtype, insn_type,
    insn_type_flags, split_jumps, word, CdrSequence, Op, SerError, SerResult, TypeCode,
    TypeDescriptor, XcdrVersion, ENCAPS_CDR2_LE, ENCAPS_CDR_LE, FLAG_BASE, FLAG_DEF, FLAG_OPT,
    PLM_FLAGS_MASK,
};

/// Deserialize one payload into zeroed sample memory.
///
/// # Safety
///
/// `sample` must point at writable, zero-initialized memory of the
/// descriptor's size and layout.
pub unsafe fn deserialize_sample(
    desc: &TypeDescriptor,
    payload: &[u8],
    sample: *mut u8,
    max_size: usize,
) -> SerResult<()> {
    if max_size > 0 && payload.len() > max_size {
        return Err(SerError::SampleTooLarge);
    }
    if payload.len() < 4 {
        return Err(SerError::InconsistentType);
    }
    let id = u16::from_be_bytes([payload[0], payload[1]]);
    let version = match id {
        ENCAPS_CDR_LE => XcdrVersion::Xcdr1,
        ENCAPS_CDR2_LE => XcdrVersion::Xcdr2,
        _ => return Err(SerError::InconsistentType),
    };
    let mut dec = CdrDecoder::new(payload, version);
    dec.skip(4)?;
    dec.rebase();
    walk(&mut dec, desc.ops, 0, sample)
}

unsafe fn walk(dec: &mut CdrDecoder, ops: &[u32], mut ip: usize, base: *mut u8) -> SerResult<()> {
    let mut frame_end: Option<usize> = None;
    loop {
        let insn = word(ops, ip)?;
        match insn_op(insn).ok_or(SerError::InconsistentType)? {
            Op::Rts => {
                if let Some(end) = frame_end {
                    // Appended members we don't know about are skipped.
                    dec.seek(end)?;
                }
                return Ok(());
            }
            Op::Dlc => {
                let size = dec.get_u32()? as usize;
                let end = dec.pos() + size;
                if end > dec.pos() + dec.remaining() {
                    return Err(SerError::InconsistentType);
                }
                frame_end = Some(end);
                ip += 1;
            }
            Op::Plc => return deser_plc(dec, ops, ip, base),
            Op::Jsr => {
                let target = offset_ip(ip, insn_jump(insn))?;
                walk(dec, ops, target, base)?;
                ip += 1;
            }
            Op::Adr => ip = deser_adr(dec, ops, ip, base)?,
            Op::Jeq | Op::Jeq4 | Op::Plm | Op::Kof => return Err(SerError::InconsistentType),
        }
    }
}

fn offset_ip(ip: usize, rel: i16) -> SerResult<usize> {
    usize::try_from(ip as isize + rel as isize).map_err(|_| SerError::InconsistentType)
}

unsafe fn write_prim(dec: &mut CdrDecoder, addr: *mut u8, code: TypeCode) -> SerResult<()> {
    match code {
        TypeCode::OneByte => *addr = dec.get_u8()?,
        TypeCode::Bln => *addr = u8::from(dec.get_u8()? != 0),
        TypeCode::TwoBytes => (addr as *mut u16).write_unaligned(dec.get_u16()?),
        TypeCode::FourBytes => (addr as *mut u32).write_unaligned(dec.get_u32()?),
        TypeCode::EightBytes => (addr as *mut u64).write_unaligned(dec.get_u64()?),
        _ => return Err(SerError::InconsistentType),
    }
    Ok(())
}

unsafe fn write_storage(addr: *mut u8, width: usize, v: u64) {
    match width {
        1 => *addr = v as u8,
        2 => (addr as *mut u16).write_unaligned(v as u16),
        4 => (addr as *mut u32).write_unaligned(v as u32),
        _ => (addr as *mut u64).write_unaligned(v),
    }
}

/// Read a string body; returns null for a zero-length encoding.
unsafe fn deser_string(dec: &mut CdrDecoder) -> SerResult<*mut u8> {
    let len = dec.get_u32()? as usize;
    if len == 0 {
        return Ok(std::ptr::null_mut());
    }
    let bytes = dec.get_bytes(len)?;
    if bytes[len - 1] != 0 {
        return Err(SerError::InconsistentType);
    }
    Ok(alloc_string_bytes(&bytes[..len - 1]))
}

unsafe fn deser_bounded_string(
    dec: &mut CdrDecoder,
    addr: *mut u8,
    max_size: usize,
) -> SerResult<()> {
    let len = dec.get_u32()? as usize;
    if len == 0 || len > max_size {
        return Err(SerError::InconsistentType);
    }
    let bytes = dec.get_bytes(len)?;
    if bytes[len - 1] != 0 {
        return Err(SerError::InconsistentType);
    }
    std::ptr::copy_nonoverlapping(bytes.as_ptr(), addr, len - 1);
    *addr.add(len - 1) = 0;
    Ok(())
}

unsafe fn deser_adr(
    dec: &mut CdrDecoder,
    ops: &[u32],
    ip: usize,
    base: *mut u8,
) -> SerResult<usize> {
    let insn = word(ops, ip)?;
    let ty = insn_type(insn).ok_or(SerError::InconsistentType)?;
    let flags = insn_flags(insn);
    let offset = word(ops, ip + 1)? as usize;
    let addr = base.add(offset);

    match ty {
        TypeCode::OneByte
        | TypeCode::TwoBytes
        | TypeCode::FourBytes
        | TypeCode::EightBytes
        | TypeCode::Bln => {
            write_prim(dec, addr, ty)?;
        }
        TypeCode::Enu => {
            let max = word(ops, ip + 2)?;
            let v = dec.get_u32()?;
            if v > max {
                return Err(SerError::InconsistentType);
            }
            write_storage(addr, super::flags_storage_size(flags), v as u64);
        }
        TypeCode::Bmk => {
            let width = super::flags_storage_size(flags);
            let bits_high = word(ops, ip + 2)? as u64;
            let bits_low = word(ops, ip + 3)? as u64;
            let valid = (bits_high << 32) | bits_low;
            let v = if width == 8 {
                dec.get_u64()?
            } else {
                dec.get_u32()? as u64
            };
            if v & !valid != 0 {
                return Err(SerError::InconsistentType);
            }
            write_storage(addr, width, v);
        }
        TypeCode::Str => {
            if flags & FLAG_OPT != 0 && dec.get_u8()? == 0 {
                (addr as *mut *mut u8).write_unaligned(std::ptr::null_mut());
                return adr_next(ops, ip);
            }
            let p = deser_string(dec)?;
            (addr as *mut *mut u8).write_unaligned(p);
        }
        TypeCode::BoundedStr => {
            let max_size = word(ops, ip + 2)? as usize;
            deser_bounded_string(dec, addr, max_size)?;
        }
        TypeCode::Seq | TypeCode::BoundedSeq => deser_seq(dec, ops, ip, insn, addr, ty)?,
        TypeCode::Arr => deser_arr(dec, ops, ip, insn, addr)?,
        TypeCode::Uni => deser_uni(dec, ops, ip, insn, base)?,
        TypeCode::Ext => {
            let (_, elem) = split_jumps(word(ops, ip + 2)?);
            let external = insn_type_flags(insn);
            let optional = flags & FLAG_OPT != 0;
            if optional && dec.get_u8()? == 0 {
                (addr as *mut *mut u8).write_unaligned(std::ptr::null_mut());
                return adr_next(ops, ip);
            }
            if external || optional {
                let elem_size = word(ops, ip + 3)? as usize;
                let p = alloc_buffer(elem_size);
                (addr as *mut *mut u8).write_unaligned(p);
                walk(dec, ops, ip + elem, p)?;
            } else {
                walk(dec, ops, ip + elem, addr)?;
            }
        }
        TypeCode::Stu => return Err(SerError::InconsistentType),
    }
    adr_next(ops, ip)
}

/// Stride of one in-memory element for a collection subtype.
fn elem_stride(sub: TypeCode, flags: u32, bst_max: usize, complex_size: usize) -> usize {
    match sub {
        TypeCode::OneByte | TypeCode::Bln => 1,
        TypeCode::TwoBytes => 2,
        TypeCode::FourBytes => 4,
        TypeCode::EightBytes => 8,
        TypeCode::Enu | TypeCode::Bmk => super::flags_storage_size(flags),
        TypeCode::Str => std::mem::size_of::<*mut u8>(),
        TypeCode::BoundedStr => bst_max,
        _ => complex_size,
    }
}

unsafe fn deser_seq(
    dec: &mut CdrDecoder,
    ops: &[u32],
    ip: usize,
    insn: u32,
    addr: *mut u8,
    ty: TypeCode,
) -> SerResult<()> {
    let sub = insn_subtype(insn).ok_or(SerError::InconsistentType)?;
    let flags = insn_flags(insn);
    let bounded = ty == TypeCode::BoundedSeq;
    let operand = |k: usize| word(ops, ip + if bounded { 2 + k } else { 1 + k });

    let len = dec.get_u32()? as usize;
    if bounded {
        let sbound = word(ops, ip + 2)? as usize;
        if len > sbound {
            return Err(SerError::InconsistentType);
        }
    }
    // Every element takes at least one wire byte; reject absurd lengths
    // before allocating.
    if len > dec.remaining() {
        return Err(SerError::InconsistentType);
    }

    let seq = addr as *mut CdrSequence;
    if len == 0 {
        (*seq).length = 0;
        (*seq).maximum = 0;
        (*seq).buffer = std::ptr::null_mut();
        (*seq).release = false;
        return Ok(());
    }

    let (bst_max, complex_size, elem_target) = match sub {
        TypeCode::BoundedStr => (operand(1)? as usize, 0, 0),
        TypeCode::Seq | TypeCode::Arr | TypeCode::Uni | TypeCode::Stu | TypeCode::BoundedSeq => {
            let elem_size = operand(1)? as usize;
            let (_, elem) = split_jumps(operand(2)?);
            (0, elem_size, ip + elem)
        }
        _ => (0, 0, 0),
    };
    let stride = elem_stride(sub, flags, bst_max, complex_size);
    let total = len.checked_mul(stride).ok_or(SerError::InconsistentType)?;
    let buffer = alloc_buffer(total);

    (*seq).length = len as u32;
    (*seq).maximum = len as u32;
    (*seq).buffer = buffer;
    (*seq).release = true;

    for i in 0..len {
        let cell = buffer.add(i * stride);
        match sub {
            TypeCode::OneByte
            | TypeCode::TwoBytes
            | TypeCode::FourBytes
            | TypeCode::EightBytes
            | TypeCode::Bln => write_prim(dec, cell, sub)?,
            TypeCode::Enu => {
                let v = dec.get_u32()?;
                write_storage(cell, stride, v as u64);
            }
            TypeCode::Bmk => {
                let v = if stride == 8 {
                    dec.get_u64()?
                } else {
                    dec.get_u32()? as u64
                };
                write_storage(cell, stride, v);
            }
            TypeCode::Str => {
                let p = deser_string(dec)?;
                (cell as *mut *mut u8).write_unaligned(p);
            }
            TypeCode::BoundedStr => deser_bounded_string(dec, cell, bst_max)?,
            TypeCode::Seq | TypeCode::Arr | TypeCode::Uni | TypeCode::Stu
            | TypeCode::BoundedSeq => walk(dec, ops, elem_target, cell)?,
            TypeCode::Ext => return Err(SerError::InconsistentType),
        }
    }
    Ok(())
}

unsafe fn deser_arr(
    dec: &mut CdrDecoder,
    ops: &[u32],
    ip: usize,
    insn: u32,
    addr: *mut u8,
) -> SerResult<()> {
    let sub = insn_subtype(insn).ok_or(SerError::InconsistentType)?;
    let flags = insn_flags(insn);
    let alen = word(ops, ip + 2)? as usize;
    match sub {
        TypeCode::OneByte
        | TypeCode::TwoBytes
        | TypeCode::FourBytes
        | TypeCode::EightBytes
        | TypeCode::Bln => {
            let size = sub.prim_size().unwrap_or(1);
            for i in 0..alen {
                write_prim(dec, addr.add(i * size), sub)?;
            }
        }
        TypeCode::Enu => {
            let width = super::flags_storage_size(flags);
            let max = word(ops, ip + 3)?;
            for i in 0..alen {
                let v = dec.get_u32()?;
                if v > max {
                    return Err(SerError::InconsistentType);
                }
                write_storage(addr.add(i * width), width, v as u64);
            }
        }
        TypeCode::Bmk => {
            let width = super::flags_storage_size(flags);
            for i in 0..alen {
                let v = if width == 8 {
                    dec.get_u64()?
                } else {
                    dec.get_u32()? as u64
                };
                write_storage(addr.add(i * width), width, v);
            }
        }
        TypeCode::Str => {
            let stride = std::mem::size_of::<*mut u8>();
            for i in 0..alen {
                let p = deser_string(dec)?;
                (addr.add(i * stride) as *mut *mut u8).write_unaligned(p);
            }
        }
        TypeCode::BoundedStr => {
            let max_size = word(ops, ip + 4)? as usize;
            for i in 0..alen {
                deser_bounded_string(dec, addr.add(i * max_size), max_size)?;
            }
        }
        TypeCode::Seq | TypeCode::Arr | TypeCode::Uni | TypeCode::Stu | TypeCode::BoundedSeq => {
            let (_, elem) = split_jumps(word(ops, ip + 3)?);
            let elem_size = word(ops, ip + 4)? as usize;
            for i in 0..alen {
                walk(dec, ops, ip + elem, addr.add(i * elem_size))?;
            }
        }
        TypeCode::Ext => return Err(SerError::InconsistentType),
    }
    Ok(())
}

unsafe fn deser_uni(
    dec: &mut CdrDecoder,
    ops: &[u32],
    ip: usize,
    insn: u32,
    base: *mut u8,
) -> SerResult<()> {
    let sub = insn_subtype(insn).ok_or(SerError::InconsistentType)?;
    let flags = insn_flags(insn);
    let offset = word(ops, ip + 1)? as usize;
    let alen = word(ops, ip + 2)? as usize;
    let (_, cases) = split_jumps(word(ops, ip + 3)?);
    let disc_addr = base.add(offset);

    let disc = match sub {
        TypeCode::OneByte | TypeCode::Bln => {
            let v = dec.get_u8()? as u64;
            *disc_addr = v as u8;
            v
        }
        TypeCode::TwoBytes => {
            let v = dec.get_u16()? as u64;
            (disc_addr as *mut u16).write_unaligned(v as u16);
            v
        }
        TypeCode::FourBytes => {
            let v = dec.get_u32()? as u64;
            (disc_addr as *mut u32).write_unaligned(v as u32);
            v
        }
        TypeCode::Enu => {
            let max = word(ops, ip + 4)?;
            let v = dec.get_u32()?;
            if v > max {
                return Err(SerError::InconsistentType);
            }
            write_storage(disc_addr, super::flags_storage_size(flags), v as u64);
            v as u64
        }
        _ => return Err(SerError::InconsistentType),
    };

    let Some(cpos) = find_union_case(ops, ip + cases, alen, disc, flags & FLAG_DEF != 0)? else {
        return Ok(());
    };
    deser_union_case(dec, ops, cpos, base)
}

unsafe fn deser_union_case(
    dec: &mut CdrDecoder,
    ops: &[u32],
    cpos: usize,
    base: *mut u8,
) -> SerResult<()> {
    let cinsn = word(ops, cpos)?;
    if insn_op(cinsn) != Some(Op::Jeq4) && insn_op(cinsn) != Some(Op::Jeq) {
        return Err(SerError::InconsistentType);
    }
    let ctype = insn_type(cinsn).ok_or(SerError::InconsistentType)?;
    let field_off = word(ops, cpos + 2)? as usize;
    let caddr = base.add(field_off);
    let ext = insn_type_flags(cinsn);
    match ctype {
        TypeCode::OneByte
        | TypeCode::TwoBytes
        | TypeCode::FourBytes
        | TypeCode::EightBytes
        | TypeCode::Bln => write_prim(dec, caddr, ctype)?,
        TypeCode::Enu => {
            let max = word(ops, cpos + 3)?;
            let v = dec.get_u32()?;
            if v > max {
                return Err(SerError::InconsistentType);
            }
            write_storage(caddr, super::flags_storage_size(insn_flags(cinsn)), v as u64);
        }
        TypeCode::Str => {
            let p = deser_string(dec)?;
            (caddr as *mut *mut u8).write_unaligned(p);
        }
        _ => {
            let target = cpos + insn_length(cinsn) as usize;
            if ext {
                let elem_size = word(ops, cpos + 3)? as usize;
                let p = alloc_buffer(elem_size);
                (caddr as *mut *mut u8).write_unaligned(p);
                walk(dec, ops, target, p)?;
            } else {
                walk(dec, ops, target, caddr)?;
            }
        }
    }
    Ok(())
}

unsafe fn deser_plc(dec: &mut CdrDecoder, ops: &[u32], ip: usize, base: *mut u8) -> SerResult<()> {
    let size = dec.get_u32()? as usize;
    if size > dec.remaining() {
        return Err(SerError::InconsistentType);
    }
    let end = dec.pos() + size;
    while dec.pos() < end {
        let header = dec.get_u32()?;
        let length = dec.get_u32()? as usize;
        let member_start = dec.pos();
        if member_start + length > end {
            return Err(SerError::InconsistentType);
        }
        let member_id = header & 0x0fff_ffff;
        let must_understand = header >> 31 != 0;
        match find_plm(ops, ip + 1, member_id)? {
            Some(target) => {
                walk(dec, ops, target, base)?;
            }
            None if must_understand => return Err(SerError::InconsistentType),
            None => {}
        }
        // Resync on the recorded member length regardless of how much the
        // member program consumed.
        dec.seek(member_start + length)?;
    }
    Ok(())
}

/// Search a PLM list (following BASE chains) for a member id.
fn find_plm(ops: &[u32], mut p: usize, member_id: u32) -> SerResult<Option<usize>> {
    loop {
        let insn = word(ops, p)?;
        match insn_op(insn).ok_or(SerError::InconsistentType)? {
            Op::Rts => return Ok(None),
            Op::Plm => {
                let plm_flags = (insn & PLM_FLAGS_MASK) >> 16;
                let elem_off = insn_length(insn) as usize;
                if plm_flags & FLAG_BASE != 0 {
                    if let Some(found) = find_plm(ops, p + elem_off, member_id)? {
                        return Ok(Some(found));
                    }
                } else if word(ops, p + 1)? == member_id {
                    return Ok(Some(p + elem_off));
                }
                p += 2;
            }
            _ => return Err(SerError::InconsistentType),
        }
    }
}
