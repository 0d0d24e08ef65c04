//! Fixed, versioned, little-endian wire types for the connectivity protocol.
//!
//! Every message is a [`WireHdr`] followed by `count` records of one kind.
//! Floating-point values travel as their IEEE-754 bit patterns in
//! little-endian order.

use crate::overset_error::OversetError;
use bytemuck::{Pod, Zeroable};
use static_assertions::assert_eq_size;
use std::mem::size_of;

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

pub const KIND_BOX: u16 = 1;
pub const KIND_WALL_BOX: u16 = 2;
pub const KIND_CUT_QUERY: u16 = 3;
pub const KIND_CUT_REPLY: u16 = 4;
pub const KIND_DONOR_QUERY: u16 = 5;
pub const KIND_DONOR_REPLY: u16 = 6;
pub const KIND_ACCEPT: u16 = 7;
pub const KIND_STATUS: u16 = 8;
pub const KIND_VALUES: u16 = 9;
pub const KIND_COUNT: u16 = 10;

#[inline]
pub fn f64_to_le(x: f64) -> u64 {
    x.to_bits().to_le()
}

#[inline]
pub fn f64_from_le(x: u64) -> f64 {
    f64::from_bits(u64::from_le(x))
}

fn vec3_to_le(v: &[f64; 3]) -> [u64; 3] {
    [f64_to_le(v[0]), f64_to_le(v[1]), f64_to_le(v[2])]
}

fn vec3_from_le(v: &[u64; 3]) -> [f64; 3] {
    [f64_from_le(v[0]), f64_from_le(v[1]), f64_from_le(v[2])]
}

// ===== Header ==============================================================

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireHdr {
    pub version_le: u16,
    pub kind_le: u16,
    pub count_le: u32,
}

impl WireHdr {
    pub fn new(kind: u16, count: usize) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            kind_le: kind.to_le(),
            count_le: (count as u32).to_le(),
        }
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
    pub fn kind(&self) -> u16 {
        u16::from_le(self.kind_le)
    }
    pub fn count(&self) -> usize {
        u32::from_le(self.count_le) as usize
    }
}

// ===== Geometry summaries ==================================================

/// Bounding box of one grid partition, with its tag and grid type.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireBox {
    pub tag_le: i32,
    pub grid_type_le: u32,
    pub min_le: [u64; 3],
    pub max_le: [u64; 3],
}

impl WireBox {
    pub fn new(tag: i32, grid_type: u32, min: &[f64; 3], max: &[f64; 3]) -> Self {
        Self {
            tag_le: tag.to_le(),
            grid_type_le: grid_type.to_le(),
            min_le: vec3_to_le(min),
            max_le: vec3_to_le(max),
        }
    }
    pub fn tag(&self) -> i32 {
        i32::from_le(self.tag_le)
    }
    pub fn grid_type(&self) -> u32 {
        u32::from_le(self.grid_type_le)
    }
    pub fn min(&self) -> [f64; 3] {
        vec3_from_le(&self.min_le)
    }
    pub fn max(&self) -> [f64; 3] {
        vec3_from_le(&self.max_le)
    }
}

/// One wall patch box of body `tag`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireWallBox {
    pub tag_le: i32,
    pub _pad: u32,
    pub min_le: [u64; 3],
    pub max_le: [u64; 3],
}

impl WireWallBox {
    pub fn new(tag: i32, min: &[f64; 3], max: &[f64; 3]) -> Self {
        Self {
            tag_le: tag.to_le(),
            _pad: 0,
            min_le: vec3_to_le(min),
            max_le: vec3_to_le(max),
        }
    }
    pub fn tag(&self) -> i32 {
        i32::from_le(self.tag_le)
    }
    pub fn min(&self) -> [f64; 3] {
        vec3_from_le(&self.min_le)
    }
    pub fn max(&self) -> [f64; 3] {
        vec3_from_le(&self.max_le)
    }
}

// ===== Overlap cut =========================================================

/// "Does any of your grids cut my node?"
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireCutQuery {
    pub node_le: u64,
    pub tag_le: i32,
    pub grid_type_le: u32,
    pub xyz_le: [u64; 3],
    pub resolution_le: u64,
}

impl WireCutQuery {
    pub fn new(node: usize, tag: i32, grid_type: u32, xyz: &[f64; 3], resolution: f64) -> Self {
        Self {
            node_le: (node as u64).to_le(),
            tag_le: tag.to_le(),
            grid_type_le: grid_type.to_le(),
            xyz_le: vec3_to_le(xyz),
            resolution_le: f64_to_le(resolution),
        }
    }
    pub fn node(&self) -> usize {
        u64::from_le(self.node_le) as usize
    }
    pub fn tag(&self) -> i32 {
        i32::from_le(self.tag_le)
    }
    pub fn grid_type(&self) -> u32 {
        u32::from_le(self.grid_type_le)
    }
    pub fn xyz(&self) -> [f64; 3] {
        vec3_from_le(&self.xyz_le)
    }
    pub fn resolution(&self) -> f64 {
        f64_from_le(self.resolution_le)
    }
}

/// A node of grid `tag` that the replying rank cuts.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireCutReply {
    pub node_le: u64,
    pub tag_le: i32,
    pub _pad: u32,
}

impl WireCutReply {
    pub fn new(node: usize, tag: i32) -> Self {
        Self {
            node_le: (node as u64).to_le(),
            tag_le: tag.to_le(),
            _pad: 0,
        }
    }
    pub fn node(&self) -> usize {
        u64::from_le(self.node_le) as usize
    }
    pub fn tag(&self) -> i32 {
        i32::from_le(self.tag_le)
    }
}

// ===== Donor search ========================================================

/// A receptor point looking for a donor; `kind, a, b` encode the receptor id.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireDonorQuery {
    pub slot_le: u64,
    pub tag_le: i32,
    pub kind_le: u32,
    pub a_le: u64,
    pub b_le: u64,
    pub xyz_le: [u64; 3],
}

impl WireDonorQuery {
    pub fn new(slot: usize, tag: i32, id: (u32, u64, u64), xyz: &[f64; 3]) -> Self {
        Self {
            slot_le: (slot as u64).to_le(),
            tag_le: tag.to_le(),
            kind_le: id.0.to_le(),
            a_le: id.1.to_le(),
            b_le: id.2.to_le(),
            xyz_le: vec3_to_le(xyz),
        }
    }
    pub fn slot(&self) -> usize {
        u64::from_le(self.slot_le) as usize
    }
    pub fn tag(&self) -> i32 {
        i32::from_le(self.tag_le)
    }
    pub fn id(&self) -> (u32, u64, u64) {
        (
            u32::from_le(self.kind_le),
            u64::from_le(self.a_le),
            u64::from_le(self.b_le),
        )
    }
    pub fn xyz(&self) -> [f64; 3] {
        vec3_from_le(&self.xyz_le)
    }
}

/// Best local donor candidate for a receptor slot.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireDonorReply {
    pub slot_le: u64,
    pub donor_tag_le: i32,
    pub _pad: u32,
    pub cell_le: u64,
    pub volume_le: u64,
}

impl WireDonorReply {
    pub fn new(slot: usize, donor_tag: i32, cell: usize, volume: f64) -> Self {
        Self {
            slot_le: (slot as u64).to_le(),
            donor_tag_le: donor_tag.to_le(),
            _pad: 0,
            cell_le: (cell as u64).to_le(),
            volume_le: f64_to_le(volume),
        }
    }
    pub fn slot(&self) -> usize {
        u64::from_le(self.slot_le) as usize
    }
    pub fn donor_tag(&self) -> i32 {
        i32::from_le(self.donor_tag_le)
    }
    pub fn cell(&self) -> usize {
        u64::from_le(self.cell_le) as usize
    }
    pub fn volume(&self) -> f64 {
        f64_from_le(self.volume_le)
    }
}

pub const ACCEPT_NEW: u32 = 1;
pub const RETAIN_OLD: u32 = 2;

/// Receptor-side decision: accept the candidate offered for `slot`, or keep
/// the previous version's record for `old_slot` under the new `slot`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireAccept {
    pub slot_le: u64,
    pub old_slot_le: u64,
    pub action_le: u32,
    pub _pad: u32,
}

impl WireAccept {
    pub fn accept(slot: usize) -> Self {
        Self {
            slot_le: (slot as u64).to_le(),
            old_slot_le: 0,
            action_le: ACCEPT_NEW.to_le(),
            _pad: 0,
        }
    }
    pub fn retain(slot: usize, old_slot: usize) -> Self {
        Self {
            slot_le: (slot as u64).to_le(),
            old_slot_le: (old_slot as u64).to_le(),
            action_le: RETAIN_OLD.to_le(),
            _pad: 0,
        }
    }
    pub fn slot(&self) -> usize {
        u64::from_le(self.slot_le) as usize
    }
    pub fn old_slot(&self) -> usize {
        u64::from_le(self.old_slot_le) as usize
    }
    pub fn action(&self) -> u32 {
        u32::from_le(self.action_le)
    }
}

/// Pass status used to agree on success across ranks.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireStatus {
    pub code_le: u32,
    pub _pad: u32,
}

impl WireStatus {
    pub fn new(code: u32) -> Self {
        Self {
            code_le: code.to_le(),
            _pad: 0,
        }
    }
    pub fn code(&self) -> u32 {
        u32::from_le(self.code_le)
    }
}

/// A record count announced ahead of a payload.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u64,
}

impl WireCount {
    pub fn new(n: usize) -> Self {
        Self {
            n_le: (n as u64).to_le(),
        }
    }
    pub fn get(&self) -> usize {
        u64::from_le(self.n_le) as usize
    }
}

/// An interpolated value.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireValue(pub u64);

impl WireValue {
    pub fn new(x: f64) -> Self {
        WireValue(f64_to_le(x))
    }
    pub fn get(&self) -> f64 {
        f64_from_le(self.0)
    }
}

// ===== Compile-time sanity checks =========================================

assert_eq_size!(WireHdr, [u8; 8]);
assert_eq_size!(WireBox, [u8; 56]);
assert_eq_size!(WireWallBox, [u8; 56]);
assert_eq_size!(WireCutQuery, [u8; 48]);
assert_eq_size!(WireCutReply, [u8; 16]);
assert_eq_size!(WireDonorQuery, [u8; 56]);
assert_eq_size!(WireDonorReply, [u8; 32]);
assert_eq_size!(WireAccept, [u8; 24]);
assert_eq_size!(WireStatus, [u8; 8]);
assert_eq_size!(WireCount, [u8; 8]);
assert_eq_size!(WireValue, [u8; 8]);

// ===== Packing =============================================================

/// Header plus records as one message.
pub fn pack<T: Pod>(kind: u16, records: &[T]) -> Vec<u8> {
    let hdr = WireHdr::new(kind, records.len());
    let mut out = Vec::with_capacity(size_of::<WireHdr>() + records.len() * size_of::<T>());
    out.extend_from_slice(bytemuck::bytes_of(&hdr));
    out.extend_from_slice(bytemuck::cast_slice(records));
    out
}

/// Decode a message produced by [`pack`], checking version, kind and length.
pub fn unpack<T: Pod>(kind: u16, bytes: &[u8]) -> Result<Vec<T>, OversetError> {
    let hsize = size_of::<WireHdr>();
    if bytes.len() < hsize {
        return Err(OversetError::WireFormat(format!(
            "message of {} bytes is shorter than its header",
            bytes.len()
        )));
    }
    let hdr: WireHdr = bytemuck::pod_read_unaligned(&bytes[..hsize]);
    if hdr.version() != WIRE_VERSION {
        return Err(OversetError::WireFormat(format!(
            "wire version {} does not match {WIRE_VERSION}",
            hdr.version()
        )));
    }
    if hdr.kind() != kind {
        return Err(OversetError::WireFormat(format!(
            "expected message kind {kind}, got {}",
            hdr.kind()
        )));
    }
    let body = &bytes[hsize..];
    let expected = hdr.count() * size_of::<T>();
    if body.len() != expected {
        return Err(OversetError::WireFormat(format!(
            "expected {expected} payload bytes, got {}",
            body.len()
        )));
    }
    Ok(body
        .chunks_exact(size_of::<T>().max(1))
        .map(bytemuck::pod_read_unaligned)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn donor_query_roundtrip() {
        let q = WireDonorQuery::new(12, -3, (1, 4, 5), &[1.5, -2.0, 3.25]);
        let bytes = pack(KIND_DONOR_QUERY, &[q]);
        let out: Vec<WireDonorQuery> = unpack(KIND_DONOR_QUERY, &bytes).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].slot(), 12);
        assert_eq!(out[0].tag(), -3);
        assert_eq!(out[0].id(), (1, 4, 5));
        assert_eq!(out[0].xyz(), [1.5, -2.0, 3.25]);
    }

    #[test]
    fn kind_mismatch_is_rejected() {
        let bytes = pack(KIND_CUT_REPLY, &[WireCutReply::new(1, 2)]);
        assert!(matches!(
            unpack::<WireCutReply>(KIND_ACCEPT, &bytes),
            Err(OversetError::WireFormat(_))
        ));
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let mut bytes = pack(KIND_VALUES, &[WireValue::new(1.0), WireValue::new(2.0)]);
        bytes.pop();
        assert!(unpack::<WireValue>(KIND_VALUES, &bytes).is_err());
        assert!(unpack::<WireValue>(KIND_VALUES, &bytes[..3]).is_err());
    }

    #[test]
    fn version_guard() {
        let mut bytes = pack::<WireStatus>(KIND_STATUS, &[]);
        bytes[0] = 99;
        assert!(unpack::<WireStatus>(KIND_STATUS, &bytes).is_err());
        assert_eq!(WireHdr::new(KIND_STATUS, 0).version(), WIRE_VERSION);
    }
}
