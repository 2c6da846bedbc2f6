// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rdds developers

//! Opcode-driven serialization: in-memory sample to CDR bytes.
//!
//! The payload starts with the usual 4-byte encapsulation header (two
//! big-endian identifier bytes plus 16 option bits); CDR alignment restarts
//! after it. Delimited and parameter-list frames emit a DHEADER in both
//! encodings so one skip rule serves XCDR1 and XCDR2 alike.

use super::cursor::CdrEncoder;
use super::sample::string_bytes;
use super::{
    adr_next, insn_flags, insn_jump, insn_length, insn_op, insn_subtype, insn_type,
    insn_type_flags, split_jumps, word, CdrSequence, Op, SerError, SerResult, TypeCode,
    TypeDescriptor, XcdrVersion, ENCAPS_CDR2_LE, ENCAPS_CDR_LE, FLAG_DEF, FLAG_MU, FLAG_OPT,
    PLM_FLAGS_MASK, FLAG_BASE,
};

/// Serialize one sample. `max_size` of zero disables the size ceiling.
///
/// # Safety
///
/// `sample` must point at a live value laid out exactly as `desc` describes.
pub unsafe fn serialize_sample(
    desc: &TypeDescriptor,
    sample: *const u8,
    version: XcdrVersion,
    max_size: usize,
) -> SerResult<Vec<u8>> {
    let mut enc = CdrEncoder::new(version);
    let id = match version {
        XcdrVersion::Xcdr1 => ENCAPS_CDR_LE,
        XcdrVersion::Xcdr2 => ENCAPS_CDR2_LE,
    };
    enc.put_u8((id >> 8) as u8);
    enc.put_u8(id as u8);
    enc.put_u8(0);
    enc.put_u8(0);
    enc.rebase();

    walk(&mut enc, desc.ops, 0, sample)?;

    let out = enc.into_bytes();
    if max_size > 0 && out.len() > max_size {
        return Err(SerError::SampleTooLarge);
    }
    Ok(out)
}

/// Process instructions from `ip` until the frame's RTS.
unsafe fn walk(enc: &mut CdrEncoder, ops: &[u32], mut ip: usize, base: *const u8) -> SerResult<()> {
    let mut dheader: Option<usize> = None;
    loop {
        let insn = word(ops, ip)?;
        match insn_op(insn).ok_or(SerError::InconsistentType)? {
            Op::Rts => {
                if let Some(pos) = dheader {
                    let body = (enc.len() - pos - 4) as u32;
                    enc.patch_u32(pos, body);
                }
                return Ok(());
            }
            Op::Dlc => {
                dheader = Some(enc.reserve_u32());
                ip += 1;
            }
            Op::Plc => return ser_plc(enc, ops, ip, base),
            Op::Jsr => {
                let target = offset_ip(ip, insn_jump(insn))?;
                walk(enc, ops, target, base)?;
                ip += 1;
            }
            Op::Adr => ip = ser_adr(enc, ops, ip, base)?,
            Op::Jeq | Op::Jeq4 | Op::Plm | Op::Kof => return Err(SerError::InconsistentType),
        }
    }
}

fn offset_ip(ip: usize, rel: i16) -> SerResult<usize> {
    let target = ip as isize + rel as isize;
    usize::try_from(target).map_err(|_| SerError::InconsistentType)
}

unsafe fn read_prim(enc: &mut CdrEncoder, addr: *const u8, code: TypeCode) {
    match code {
        TypeCode::OneByte => enc.put_u8(*addr),
        TypeCode::Bln => enc.put_u8(u8::from(*addr != 0)),
        TypeCode::TwoBytes => enc.put_u16((addr as *const u16).read_unaligned()),
        TypeCode::FourBytes => enc.put_u32((addr as *const u32).read_unaligned()),
        TypeCode::EightBytes => enc.put_u64((addr as *const u64).read_unaligned()),
        _ => unreachable!("read_prim called with non-primitive code"),
    }
}

/// Read an enum/bitmask cell at its storage width, widened to u64.
unsafe fn read_storage(addr: *const u8, width: usize) -> u64 {
    match width {
        1 => *addr as u64,
        2 => (addr as *const u16).read_unaligned() as u64,
        4 => (addr as *const u32).read_unaligned() as u64,
        _ => (addr as *const u64).read_unaligned(),
    }
}

unsafe fn ser_string(enc: &mut CdrEncoder, ptr: *const u8) {
    if ptr.is_null() {
        enc.put_u32(1);
        enc.put_u8(0);
    } else {
        let bytes = string_bytes(ptr);
        enc.put_u32(bytes.len() as u32 + 1);
        enc.put_bytes(bytes);
        enc.put_u8(0);
    }
}

/// Bounded string stored inline: NUL-terminated within `max_size` bytes.
unsafe fn ser_bounded_string(enc: &mut CdrEncoder, addr: *const u8, max_size: usize) -> SerResult<()> {
    let mut len = 0usize;
    while len < max_size && *addr.add(len) != 0 {
        len += 1;
    }
    if len + 1 > max_size {
        return Err(SerError::SampleTooLarge);
    }
    enc.put_u32(len as u32 + 1);
    enc.put_bytes(std::slice::from_raw_parts(addr, len));
    enc.put_u8(0);
    Ok(())
}

/// Serialize the field of one ADR and return the next instruction index.
unsafe fn ser_adr(
    enc: &mut CdrEncoder,
    ops: &[u32],
    ip: usize,
    base: *const u8,
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
            read_prim(enc, addr, ty);
        }
        TypeCode::Enu => {
            let width = super::flags_storage_size(flags);
            enc.put_u32(read_storage(addr, width) as u32);
        }
        TypeCode::Bmk => {
            let width = super::flags_storage_size(flags);
            let v = read_storage(addr, width);
            if width == 8 {
                enc.put_u64(v);
            } else {
                enc.put_u32(v as u32);
            }
        }
        TypeCode::Str => {
            let p = (addr as *const *const u8).read_unaligned();
            if flags & FLAG_OPT != 0 {
                enc.put_u8(u8::from(!p.is_null()));
                if p.is_null() {
                    return adr_next(ops, ip);
                }
            }
            ser_string(enc, p);
        }
        TypeCode::BoundedStr => {
            let max_size = word(ops, ip + 2)? as usize;
            ser_bounded_string(enc, addr, max_size)?;
        }
        TypeCode::Seq | TypeCode::BoundedSeq => ser_seq(enc, ops, ip, insn, addr, ty)?,
        TypeCode::Arr => ser_arr(enc, ops, ip, insn, addr)?,
        TypeCode::Uni => ser_uni(enc, ops, ip, insn, base)?,
        TypeCode::Ext => {
            let (_, elem) = split_jumps(word(ops, ip + 2)?);
            let p = (addr as *const *const u8).read_unaligned();
            if flags & FLAG_OPT != 0 {
                enc.put_u8(u8::from(!p.is_null()));
                if p.is_null() {
                    return adr_next(ops, ip);
                }
            } else if p.is_null() && insn_type_flags(insn) {
                return Err(SerError::InconsistentType);
            }
            let target = if insn_type_flags(insn) || flags & FLAG_OPT != 0 {
                p
            } else {
                // Inline parent member (FLAG_BASE chains): field is embedded.
                addr
            };
            walk(enc, ops, ip + elem, target)?;
        }
        TypeCode::Stu => return Err(SerError::InconsistentType),
    }
    adr_next(ops, ip)
}

unsafe fn ser_seq(
    enc: &mut CdrEncoder,
    ops: &[u32],
    ip: usize,
    insn: u32,
    addr: *const u8,
    ty: TypeCode,
) -> SerResult<()> {
    let sub = insn_subtype(insn).ok_or(SerError::InconsistentType)?;
    let bounded = ty == TypeCode::BoundedSeq;
    let seq = &*(addr as *const CdrSequence);
    let len = seq.length as usize;

    if bounded {
        let sbound = word(ops, ip + 2)? as usize;
        if len > sbound {
            return Err(SerError::SampleTooLarge);
        }
    }
    enc.put_u32(len as u32);
    if len == 0 {
        return Ok(());
    }
    if seq.buffer.is_null() {
        return Err(SerError::InconsistentType);
    }
    let operand = |k: usize| word(ops, ip + if bounded { 2 + k } else { 1 + k });

    match sub {
        TypeCode::OneByte
        | TypeCode::TwoBytes
        | TypeCode::FourBytes
        | TypeCode::EightBytes
        | TypeCode::Bln => {
            let size = sub.prim_size().unwrap_or(1);
            for i in 0..len {
                read_prim(enc, seq.buffer.add(i * size), sub);
            }
        }
        TypeCode::Enu => {
            let width = super::flags_storage_size(insn_flags(insn));
            for i in 0..len {
                enc.put_u32(read_storage(seq.buffer.add(i * width), width) as u32);
            }
        }
        TypeCode::Bmk => {
            let width = super::flags_storage_size(insn_flags(insn));
            for i in 0..len {
                let v = read_storage(seq.buffer.add(i * width), width);
                if width == 8 {
                    enc.put_u64(v);
                } else {
                    enc.put_u32(v as u32);
                }
            }
        }
        TypeCode::Str => {
            let stride = std::mem::size_of::<*const u8>();
            for i in 0..len {
                let p = (seq.buffer.add(i * stride) as *const *const u8).read_unaligned();
                ser_string(enc, p);
            }
        }
        TypeCode::BoundedStr => {
            let max_size = operand(1)? as usize;
            for i in 0..len {
                ser_bounded_string(enc, seq.buffer.add(i * max_size), max_size)?;
            }
        }
        TypeCode::Seq | TypeCode::Arr | TypeCode::Uni | TypeCode::Stu | TypeCode::BoundedSeq => {
            let elem_size = operand(1)? as usize;
            let (_, elem) = split_jumps(operand(2)?);
            for i in 0..len {
                walk(enc, ops, ip + elem, seq.buffer.add(i * elem_size))?;
            }
        }
        TypeCode::Ext => return Err(SerError::InconsistentType),
    }
    Ok(())
}

unsafe fn ser_arr(
    enc: &mut CdrEncoder,
    ops: &[u32],
    ip: usize,
    insn: u32,
    addr: *const u8,
) -> SerResult<()> {
    let sub = insn_subtype(insn).ok_or(SerError::InconsistentType)?;
    let alen = word(ops, ip + 2)? as usize;
    match sub {
        TypeCode::OneByte
        | TypeCode::TwoBytes
        | TypeCode::FourBytes
        | TypeCode::EightBytes
        | TypeCode::Bln => {
            let size = sub.prim_size().unwrap_or(1);
            for i in 0..alen {
                read_prim(enc, addr.add(i * size), sub);
            }
        }
        TypeCode::Enu => {
            let width = super::flags_storage_size(insn_flags(insn));
            for i in 0..alen {
                enc.put_u32(read_storage(addr.add(i * width), width) as u32);
            }
        }
        TypeCode::Bmk => {
            let width = super::flags_storage_size(insn_flags(insn));
            for i in 0..alen {
                let v = read_storage(addr.add(i * width), width);
                if width == 8 {
                    enc.put_u64(v);
                } else {
                    enc.put_u32(v as u32);
                }
            }
        }
        TypeCode::Str => {
            let stride = std::mem::size_of::<*const u8>();
            for i in 0..alen {
                let p = (addr.add(i * stride) as *const *const u8).read_unaligned();
                ser_string(enc, p);
            }
        }
        TypeCode::BoundedStr => {
            let max_size = word(ops, ip + 4)? as usize;
            for i in 0..alen {
                ser_bounded_string(enc, addr.add(i * max_size), max_size)?;
            }
        }
        TypeCode::Seq | TypeCode::Arr | TypeCode::Uni | TypeCode::Stu | TypeCode::BoundedSeq => {
            let (_, elem) = split_jumps(word(ops, ip + 3)?);
            let elem_size = word(ops, ip + 4)? as usize;
            for i in 0..alen {
                walk(enc, ops, ip + elem, addr.add(i * elem_size))?;
            }
        }
        TypeCode::Ext => return Err(SerError::InconsistentType),
    }
    Ok(())
}

/// Locate a union case by discriminant. Returns the case's instruction index.
pub(super) fn find_union_case(
    ops: &[u32],
    case_base: usize,
    alen: usize,
    disc: u64,
    has_default: bool,
) -> SerResult<Option<usize>> {
    for c in 0..alen {
        let cpos = case_base + 4 * c;
        if word(ops, cpos + 1)? as u64 == disc {
            return Ok(Some(cpos));
        }
    }
    if has_default && alen > 0 {
        Ok(Some(case_base + 4 * (alen - 1)))
    } else {
        Ok(None)
    }
}

unsafe fn ser_uni(
    enc: &mut CdrEncoder,
    ops: &[u32],
    ip: usize,
    insn: u32,
    base: *const u8,
) -> SerResult<()> {
    let sub = insn_subtype(insn).ok_or(SerError::InconsistentType)?;
    let flags = insn_flags(insn);
    let offset = word(ops, ip + 1)? as usize;
    let alen = word(ops, ip + 2)? as usize;
    let (_, cases) = split_jumps(word(ops, ip + 3)?);
    let disc_addr = base.add(offset);

    let disc = match sub {
        TypeCode::OneByte | TypeCode::Bln => *disc_addr as u64,
        TypeCode::TwoBytes => (disc_addr as *const u16).read_unaligned() as u64,
        TypeCode::FourBytes => (disc_addr as *const u32).read_unaligned() as u64,
        TypeCode::Enu => {
            read_storage(disc_addr, super::flags_storage_size(flags))
        }
        _ => return Err(SerError::InconsistentType),
    };
    match sub {
        TypeCode::OneByte | TypeCode::Bln => enc.put_u8(disc as u8),
        TypeCode::TwoBytes => enc.put_u16(disc as u16),
        _ => enc.put_u32(disc as u32),
    }

    let Some(cpos) = find_union_case(ops, ip + cases, alen, disc, flags & FLAG_DEF != 0)? else {
        return Ok(());
    };
    ser_union_case(enc, ops, cpos, base)
}

unsafe fn ser_union_case(
    enc: &mut CdrEncoder,
    ops: &[u32],
    cpos: usize,
    base: *const u8,
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
        | TypeCode::Bln => read_prim(enc, caddr, ctype),
        TypeCode::Enu => {
            let width = super::flags_storage_size(insn_flags(cinsn));
            enc.put_u32(read_storage(caddr, width) as u32);
        }
        TypeCode::Str => {
            let p = (caddr as *const *const u8).read_unaligned();
            ser_string(enc, p);
        }
        _ => {
            // Aggregated case: jump to the case subroutine.
            let target = cpos + insn_length(cinsn) as usize;
            let cbase = if ext {
                let p = (caddr as *const *const u8).read_unaligned();
                if p.is_null() {
                    return Err(SerError::InconsistentType);
                }
                p
            } else {
                caddr
            };
            walk(enc, ops, target, cbase)?;
        }
    }
    Ok(())
}

/// Parameter-list CDR: DHEADER, then one (id, length)-headed chunk per
/// present member.
unsafe fn ser_plc(enc: &mut CdrEncoder, ops: &[u32], ip: usize, base: *const u8) -> SerResult<()> {
    let dheader = enc.reserve_u32();
    ser_plm_list(enc, ops, ip + 1, base)?;
    let body = (enc.len() - dheader - 4) as u32;
    enc.patch_u32(dheader, body);
    Ok(())
}

unsafe fn ser_plm_list(
    enc: &mut CdrEncoder,
    ops: &[u32],
    mut p: usize,
    base: *const u8,
) -> SerResult<()> {
    loop {
        let insn = word(ops, p)?;
        match insn_op(insn).ok_or(SerError::InconsistentType)? {
            Op::Rts => return Ok(()),
            Op::Plm => {
                let plm_flags = (insn & PLM_FLAGS_MASK) >> 16;
                let elem_off = insn_length(insn) as usize;
                let member_id = word(ops, p + 1)?;
                if plm_flags & FLAG_BASE != 0 {
                    // Chain into the base type's member list.
                    ser_plm_list(enc, ops, p + elem_off, base)?;
                } else {
                    let target = p + elem_off;
                    if !member_absent(ops, target, base)? {
                        let mu = member_flags(ops, target)? & FLAG_MU != 0;
                        let header = (u32::from(mu) << 31) | (member_id & 0x0fff_ffff);
                        enc.put_u32(header);
                        let lpos = enc.reserve_u32();
                        let start = enc.len();
                        walk(enc, ops, target, base)?;
                        enc.patch_u32(lpos, (enc.len() - start) as u32);
                    }
                }
                p += 2;
            }
            _ => return Err(SerError::InconsistentType),
        }
    }
}

/// A member is absent iff its leading ADR is optional and the pointer slot
/// is null.
unsafe fn member_absent(ops: &[u32], target: usize, base: *const u8) -> SerResult<bool> {
    let insn = word(ops, target)?;
    if insn_op(insn) != Some(Op::Adr) || insn_flags(insn) & FLAG_OPT == 0 {
        return Ok(false);
    }
    let offset = word(ops, target + 1)? as usize;
    let p = (base.add(offset) as *const *const u8).read_unaligned();
    Ok(p.is_null())
}

fn member_flags(ops: &[u32], target: usize) -> SerResult<u32> {
    Ok(insn_flags(word(ops, target)?))
}
