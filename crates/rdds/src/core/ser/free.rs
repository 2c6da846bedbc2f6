// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rdds developers

//! Deep free: release every owned string, sequence buffer and external
//! field a sample holds, driven by the same opcode program as
//! (de)serialization. Freed pointer slots are nulled, so a second walk over
//! the same sample is a no-op.

use super::sample::{dealloc_raw, free_buffer, free_string};
use super::{
    adr_next, insn_flags, insn_jump, insn_length, insn_op, insn_subtype, insn_type,
    insn_type_flags, split_jumps, word, CdrSequence, Op, SerError, SerResult, TypeCode,
    TypeDescriptor, FLAG_BASE, FLAG_DEF, FLAG_KEY, FLAG_OPT, PLM_FLAGS_MASK,
};

/// What part of the sample to release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeScope {
    /// Owned contents plus the sample allocation itself.
    Sample,
    /// Owned contents only; the sample memory stays usable (zero pointers).
    Contents,
    /// Only the contents of key fields.
    Key,
}

/// Deep-free a sample per the descriptor's program.
///
/// # Safety
///
/// `sample` must be a live sample laid out per `desc`, with every pointer
/// slot either null or owned by the sample. With `FreeScope::Sample` the
/// memory must originate from `sample::alloc_raw` and is unusable after.
pub unsafe fn free_sample(desc: &TypeDescriptor, sample: *mut u8, scope: FreeScope) -> SerResult<()> {
    if sample.is_null() {
        return Ok(());
    }
    let keys_only = scope == FreeScope::Key;
    free_ops(desc.ops, 0, sample, keys_only)?;
    if scope == FreeScope::Sample {
        dealloc_raw(desc, sample);
    }
    Ok(())
}

unsafe fn free_ops(ops: &[u32], mut ip: usize, base: *mut u8, keys_only: bool) -> SerResult<()> {
    loop {
        let insn = word(ops, ip)?;
        match insn_op(insn).ok_or(SerError::InconsistentType)? {
            Op::Rts => return Ok(()),
            Op::Dlc => ip += 1,
            Op::Plc => return free_plm_list(ops, ip + 1, base, keys_only),
            Op::Jsr => {
                let target = usize::try_from(ip as isize + insn_jump(insn) as isize)
                    .map_err(|_| SerError::InconsistentType)?;
                free_ops(ops, target, base, keys_only)?;
                ip += 1;
            }
            Op::Adr => {
                free_adr(ops, ip, base, keys_only)?;
                ip = adr_next(ops, ip)?;
            }
            Op::Jeq | Op::Jeq4 | Op::Plm | Op::Kof => return Err(SerError::InconsistentType),
        }
    }
}

unsafe fn free_adr(ops: &[u32], ip: usize, base: *mut u8, keys_only: bool) -> SerResult<()> {
    let insn = word(ops, ip)?;
    let ty = insn_type(insn).ok_or(SerError::InconsistentType)?;
    let flags = insn_flags(insn);
    if keys_only && flags & FLAG_KEY == 0 {
        return Ok(());
    }
    let offset = word(ops, ip + 1)? as usize;
    let addr = base.add(offset);

    match ty {
        // Scalars own nothing.
        TypeCode::OneByte
        | TypeCode::TwoBytes
        | TypeCode::FourBytes
        | TypeCode::EightBytes
        | TypeCode::Bln
        | TypeCode::Enu
        | TypeCode::Bmk
        | TypeCode::BoundedStr => {}
        TypeCode::Str => {
            let slot = addr as *mut *mut u8;
            free_string(slot.read_unaligned());
            slot.write_unaligned(std::ptr::null_mut());
        }
        TypeCode::Seq | TypeCode::BoundedSeq => free_seq(ops, ip, insn, addr, ty, keys_only)?,
        TypeCode::Arr => free_arr(ops, ip, insn, addr, keys_only)?,
        TypeCode::Uni => free_uni(ops, ip, insn, base, keys_only)?,
        TypeCode::Ext => {
            let (_, elem) = split_jumps(word(ops, ip + 2)?);
            let external = insn_type_flags(insn);
            let optional = flags & FLAG_OPT != 0;
            if external || optional {
                let slot = addr as *mut *mut u8;
                let p = slot.read_unaligned();
                if !p.is_null() {
                    free_ops(ops, ip + elem, p, keys_only)?;
                    let elem_size = word(ops, ip + 3)? as usize;
                    free_buffer(p, elem_size);
                    slot.write_unaligned(std::ptr::null_mut());
                }
            } else {
                free_ops(ops, ip + elem, addr, keys_only)?;
            }
        }
        TypeCode::Stu => return Err(SerError::InconsistentType),
    }
    Ok(())
}

unsafe fn free_seq(
    ops: &[u32],
    ip: usize,
    insn: u32,
    addr: *mut u8,
    ty: TypeCode,
    keys_only: bool,
) -> SerResult<()> {
    let sub = insn_subtype(insn).ok_or(SerError::InconsistentType)?;
    let bounded = ty == TypeCode::BoundedSeq;
    let operand = |k: usize| word(ops, ip + if bounded { 2 + k } else { 1 + k });
    let seq = addr as *mut CdrSequence;
    let buffer = (*seq).buffer;
    if buffer.is_null() {
        return Ok(());
    }
    let len = (*seq).length as usize;
    let capacity = (*seq).maximum as usize;

    let stride = match sub {
        TypeCode::OneByte | TypeCode::Bln => 1,
        TypeCode::TwoBytes => 2,
        TypeCode::FourBytes => 4,
        TypeCode::EightBytes => 8,
        TypeCode::Enu | TypeCode::Bmk => super::flags_storage_size(insn_flags(insn)),
        TypeCode::Str => {
            let stride = std::mem::size_of::<*mut u8>();
            for i in 0..len {
                let slot = buffer.add(i * stride) as *mut *mut u8;
                free_string(slot.read_unaligned());
                slot.write_unaligned(std::ptr::null_mut());
            }
            stride
        }
        TypeCode::BoundedStr => operand(1)? as usize,
        TypeCode::Seq | TypeCode::Arr | TypeCode::Uni | TypeCode::Stu | TypeCode::BoundedSeq => {
            let elem_size = operand(1)? as usize;
            let (_, elem) = split_jumps(operand(2)?);
            for i in 0..len {
                free_ops(ops, ip + elem, buffer.add(i * elem_size), keys_only)?;
            }
            elem_size
        }
        TypeCode::Ext => return Err(SerError::InconsistentType),
    };

    if (*seq).release {
        free_buffer(buffer, capacity * stride);
    }
    (*seq).length = 0;
    (*seq).maximum = 0;
    (*seq).buffer = std::ptr::null_mut();
    (*seq).release = false;
    Ok(())
}

unsafe fn free_arr(
    ops: &[u32],
    ip: usize,
    insn: u32,
    addr: *mut u8,
    keys_only: bool,
) -> SerResult<()> {
    let sub = insn_subtype(insn).ok_or(SerError::InconsistentType)?;
    let alen = word(ops, ip + 2)? as usize;
    match sub {
        TypeCode::Str => {
            let stride = std::mem::size_of::<*mut u8>();
            for i in 0..alen {
                let slot = addr.add(i * stride) as *mut *mut u8;
                free_string(slot.read_unaligned());
                slot.write_unaligned(std::ptr::null_mut());
            }
        }
        TypeCode::Seq | TypeCode::Arr | TypeCode::Uni | TypeCode::Stu | TypeCode::BoundedSeq => {
            let (_, elem) = split_jumps(word(ops, ip + 3)?);
            let elem_size = word(ops, ip + 4)? as usize;
            for i in 0..alen {
                free_ops(ops, ip + elem, addr.add(i * elem_size), keys_only)?;
            }
        }
        _ => {}
    }
    Ok(())
}

unsafe fn free_uni(
    ops: &[u32],
    ip: usize,
    insn: u32,
    base: *mut u8,
    keys_only: bool,
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
            let width = super::flags_storage_size(flags);
            match width {
                1 => *disc_addr as u64,
                2 => (disc_addr as *const u16).read_unaligned() as u64,
                4 => (disc_addr as *const u32).read_unaligned() as u64,
                _ => (disc_addr as *const u64).read_unaligned(),
            }
        }
        _ => return Err(SerError::InconsistentType),
    };
    let Some(cpos) = super::serialize::find_union_case(ops, ip + cases, alen, disc, flags & FLAG_DEF != 0)?
    else {
        return Ok(());
    };

    let cinsn = word(ops, cpos)?;
    let ctype = insn_type(cinsn).ok_or(SerError::InconsistentType)?;
    let field_off = word(ops, cpos + 2)? as usize;
    let caddr = base.add(field_off);
    match ctype {
        TypeCode::Str => {
            let slot = caddr as *mut *mut u8;
            free_string(slot.read_unaligned());
            slot.write_unaligned(std::ptr::null_mut());
        }
        TypeCode::Seq | TypeCode::Arr | TypeCode::Uni | TypeCode::Stu | TypeCode::BoundedSeq => {
            let target = cpos + insn_length(cinsn) as usize;
            if insn_type_flags(cinsn) {
                let slot = caddr as *mut *mut u8;
                let p = slot.read_unaligned();
                if !p.is_null() {
                    free_ops(ops, target, p, keys_only)?;
                    let elem_size = word(ops, cpos + 3)? as usize;
                    free_buffer(p, elem_size);
                    slot.write_unaligned(std::ptr::null_mut());
                }
            } else {
                free_ops(ops, target, caddr, keys_only)?;
            }
        }
        _ => {}
    }
    Ok(())
}

unsafe fn free_plm_list(ops: &[u32], mut p: usize, base: *mut u8, keys_only: bool) -> SerResult<()> {
    loop {
        let insn = word(ops, p)?;
        match insn_op(insn).ok_or(SerError::InconsistentType)? {
            Op::Rts => return Ok(()),
            Op::Plm => {
                let plm_flags = (insn & PLM_FLAGS_MASK) >> 16;
                let elem_off = insn_length(insn) as usize;
                if plm_flags & FLAG_BASE != 0 {
                    free_plm_list(ops, p + elem_off, base, keys_only)?;
                } else {
                    free_ops(ops, p + elem_off, base, keys_only)?;
                }
                p += 2;
            }
            _ => return Err(SerError::InconsistentType),
        }
    }
}
