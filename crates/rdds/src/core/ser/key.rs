// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rdds developers

//! Key extraction and instance hashing.
//!
//! Key fields are encoded in key-index order into a canonical big-endian
//! CDR stream (4-byte-capped alignment). If the encoding fits 16 bytes and
//! the descriptor's fixed-key flag is set for the chosen representation,
//! the zero-padded stream *is* the key hash; otherwise the hash is its MD5.
//!
//! Each key descriptor points at a KOF instruction:
//! `[KOF, 0, n] [op-idx 1] ... [op-idx n]`: a chain of ADR instruction
//! indices whose member offsets accumulate to the key field's location, the
//! last of which names the field's type.

use md5::{Digest, Md5};

use crate::core::types::KeyHash;

use super::sample::string_bytes;
use super::{
    flags_storage_size, insn_flags, insn_length, insn_op, insn_subtype, insn_type, word, Op,
    SerError, SerResult, TypeCode, TypeDescriptor, XcdrVersion, FIXED_KEY_MAX_SIZE,
};

/// Big-endian encoder for canonical key streams (alignment capped at 4).
struct KeyEncoder {
    buf: Vec<u8>,
}

impl KeyEncoder {
    fn new() -> Self {
        KeyEncoder { buf: Vec::new() }
    }

    fn align(&mut self, natural: usize) {
        let align = natural.min(4);
        if align > 1 {
            let pad = (align - self.buf.len() % align) % align;
            self.buf.extend(std::iter::repeat(0u8).take(pad));
        }
    }

    fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn put_u16(&mut self, v: u16) {
        self.align(2);
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn put_u32(&mut self, v: u32) {
        self.align(4);
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn put_u64(&mut self, v: u64) {
        self.align(8);
        self.buf.extend_from_slice(&v.to_be_bytes());
    }
}

/// Big-endian decoder for canonical key streams.
struct KeyDecoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> KeyDecoder<'a> {
    fn new(buf: &'a [u8]) -> Self {
        KeyDecoder { buf, pos: 0 }
    }

    fn align(&mut self, natural: usize) -> SerResult<()> {
        let align = natural.min(4);
        if align > 1 {
            let pad = (align - self.pos % align) % align;
            if self.pos + pad > self.buf.len() {
                return Err(SerError::InconsistentType);
            }
            self.pos += pad;
        }
        Ok(())
    }

    fn take(&mut self, n: usize) -> SerResult<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(SerError::InconsistentType)?;
        if end > self.buf.len() {
            return Err(SerError::InconsistentType);
        }
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn get_u8(&mut self) -> SerResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn get_u16(&mut self) -> SerResult<u16> {
        self.align(2)?;
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn get_u32(&mut self) -> SerResult<u32> {
        self.align(4)?;
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn get_u64(&mut self) -> SerResult<u64> {
        self.align(8)?;
        let b = self.take(8)?;
        let mut w = [0u8; 8];
        w.copy_from_slice(b);
        Ok(u64::from_be_bytes(w))
    }
}

/// Resolve one key chain: accumulated byte offset plus the final ADR index.
fn resolve_key_chain(desc: &TypeDescriptor, kof_at: usize) -> SerResult<(usize, usize)> {
    let ops = desc.ops;
    let kof = word(ops, kof_at)?;
    if insn_op(kof) != Some(Op::Kof) {
        return Err(SerError::InconsistentType);
    }
    let n = insn_length(kof) as usize;
    if n == 0 {
        return Err(SerError::InconsistentType);
    }
    let mut offset = 0usize;
    let mut last_adr = 0usize;
    for i in 0..n {
        let adr_idx = word(ops, kof_at + 1 + i)? as usize;
        let insn = word(ops, adr_idx)?;
        if insn_op(insn) != Some(Op::Adr) {
            return Err(SerError::InconsistentType);
        }
        offset += word(ops, adr_idx + 1)? as usize;
        last_adr = adr_idx;
    }
    Ok((offset, last_adr))
}

/// Extract the canonical big-endian key stream from a sample.
///
/// # Safety
///
/// `sample` must be a live sample laid out per `desc`.
pub unsafe fn extract_key_cdr(desc: &TypeDescriptor, sample: *const u8) -> SerResult<Vec<u8>> {
    let mut keys: Vec<_> = desc.keys.iter().collect();
    keys.sort_by_key(|k| k.index);

    let mut enc = KeyEncoder::new();
    for key in keys {
        let (offset, adr_idx) = resolve_key_chain(desc, key.ops_offset as usize)?;
        let insn = word(desc.ops, adr_idx)?;
        let ty = insn_type(insn).ok_or(SerError::InconsistentType)?;
        let addr = sample.add(offset);
        match ty {
            TypeCode::OneByte => enc.put_u8(*addr),
            TypeCode::Bln => enc.put_u8(u8::from(*addr != 0)),
            TypeCode::TwoBytes => enc.put_u16((addr as *const u16).read_unaligned()),
            TypeCode::FourBytes => enc.put_u32((addr as *const u32).read_unaligned()),
            TypeCode::EightBytes => enc.put_u64((addr as *const u64).read_unaligned()),
            TypeCode::Enu => {
                let width = flags_storage_size(insn_flags(insn));
                let v = match width {
                    1 => *addr as u64,
                    2 => (addr as *const u16).read_unaligned() as u64,
                    _ => (addr as *const u32).read_unaligned() as u64,
                };
                enc.put_u32(v as u32);
            }
            TypeCode::Str => {
                let p = (addr as *const *const u8).read_unaligned();
                let bytes = if p.is_null() { &[][..] } else { string_bytes(p) };
                enc.put_u32(bytes.len() as u32 + 1);
                enc.buf.extend_from_slice(bytes);
                enc.put_u8(0);
            }
            TypeCode::BoundedStr => {
                let max_size = word(desc.ops, adr_idx + 2)? as usize;
                let mut len = 0usize;
                while len < max_size && *addr.add(len) != 0 {
                    len += 1;
                }
                enc.put_u32(len as u32 + 1);
                enc.buf
                    .extend_from_slice(std::slice::from_raw_parts(addr, len));
                enc.put_u8(0);
            }
            TypeCode::Arr => {
                // Arrays of fixed-width primitives are the only keyable
                // collection shape.
                let sub = insn_subtype(insn).ok_or(SerError::InconsistentType)?;
                let alen = word(desc.ops, adr_idx + 2)? as usize;
                let size = sub.prim_size().ok_or(SerError::InconsistentType)?;
                for i in 0..alen {
                    let cell = addr.add(i * size);
                    match size {
                        1 => enc.put_u8(*cell),
                        2 => enc.put_u16((cell as *const u16).read_unaligned()),
                        4 => enc.put_u32((cell as *const u32).read_unaligned()),
                        _ => enc.put_u64((cell as *const u64).read_unaligned()),
                    }
                }
            }
            _ => return Err(SerError::InconsistentType),
        }
    }
    Ok(enc.buf)
}

/// Reconstruct the key fields of a sample from a canonical key stream.
///
/// # Safety
///
/// `sample` must be writable memory laid out per `desc` with the key-field
/// pointer slots empty.
pub unsafe fn key_cdr_into_sample(
    desc: &TypeDescriptor,
    key_cdr: &[u8],
    sample: *mut u8,
) -> SerResult<()> {
    let mut keys: Vec<_> = desc.keys.iter().collect();
    keys.sort_by_key(|k| k.index);

    let mut dec = KeyDecoder::new(key_cdr);
    for key in keys {
        let (offset, adr_idx) = resolve_key_chain(desc, key.ops_offset as usize)?;
        let insn = word(desc.ops, adr_idx)?;
        let ty = insn_type(insn).ok_or(SerError::InconsistentType)?;
        let addr = sample.add(offset);
        match ty {
            TypeCode::OneByte | TypeCode::Bln => *addr = dec.get_u8()?,
            TypeCode::TwoBytes => (addr as *mut u16).write_unaligned(dec.get_u16()?),
            TypeCode::FourBytes => (addr as *mut u32).write_unaligned(dec.get_u32()?),
            TypeCode::EightBytes => (addr as *mut u64).write_unaligned(dec.get_u64()?),
            TypeCode::Enu => {
                let width = flags_storage_size(insn_flags(insn));
                let v = dec.get_u32()? as u64;
                match width {
                    1 => *addr = v as u8,
                    2 => (addr as *mut u16).write_unaligned(v as u16),
                    _ => (addr as *mut u32).write_unaligned(v as u32),
                }
            }
            TypeCode::Str => {
                let len = dec.get_u32()? as usize;
                if len == 0 {
                    (addr as *mut *mut u8).write_unaligned(std::ptr::null_mut());
                } else {
                    let bytes = dec.take(len)?;
                    if bytes[len - 1] != 0 {
                        return Err(SerError::InconsistentType);
                    }
                    let p = super::sample::alloc_string_bytes(&bytes[..len - 1]);
                    (addr as *mut *mut u8).write_unaligned(p);
                }
            }
            TypeCode::BoundedStr => {
                let max_size = word(desc.ops, adr_idx + 2)? as usize;
                let len = dec.get_u32()? as usize;
                if len == 0 || len > max_size {
                    return Err(SerError::InconsistentType);
                }
                let bytes = dec.take(len)?;
                std::ptr::copy_nonoverlapping(bytes.as_ptr(), addr, len - 1);
                *addr.add(len - 1) = 0;
            }
            TypeCode::Arr => {
                let sub = insn_subtype(insn).ok_or(SerError::InconsistentType)?;
                let alen = word(desc.ops, adr_idx + 2)? as usize;
                let size = sub.prim_size().ok_or(SerError::InconsistentType)?;
                for i in 0..alen {
                    let cell = addr.add(i * size);
                    match size {
                        1 => *cell = dec.get_u8()?,
                        2 => (cell as *mut u16).write_unaligned(dec.get_u16()?),
                        4 => (cell as *mut u32).write_unaligned(dec.get_u32()?),
                        _ => (cell as *mut u64).write_unaligned(dec.get_u64()?),
                    }
                }
            }
            _ => return Err(SerError::InconsistentType),
        }
    }
    Ok(())
}

/// Fold a key stream into the 16-byte key hash.
#[must_use]
pub fn keyhash_from_key_cdr(key_cdr: &[u8], force_md5: bool) -> KeyHash {
    if !force_md5 && key_cdr.len() <= FIXED_KEY_MAX_SIZE {
        let mut h = [0u8; 16];
        h[..key_cdr.len()].copy_from_slice(key_cdr);
        KeyHash(h)
    } else {
        let mut hasher = Md5::new();
        hasher.update(key_cdr);
        let digest = hasher.finalize();
        let mut h = [0u8; 16];
        h.copy_from_slice(&digest);
        KeyHash(h)
    }
}

/// Extract the key hash directly from a sample.
///
/// # Safety
///
/// `sample` must be a live sample laid out per `desc`.
pub unsafe fn keyhash_from_sample(
    desc: &TypeDescriptor,
    sample: *const u8,
    version: XcdrVersion,
) -> SerResult<(Vec<u8>, KeyHash)> {
    if !desc.has_key() {
        return Ok((Vec::new(), KeyHash::NONE));
    }
    let key_cdr = extract_key_cdr(desc, sample)?;
    let hash = keyhash_from_key_cdr(&key_cdr, !desc.fixed_key(version));
    Ok((key_cdr, hash))
}
