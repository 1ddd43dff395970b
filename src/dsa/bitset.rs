// fixed length bit set indexed by model indices
// used for the throwaway exclusion sets of the k shortest path search
#[derive(Clone,Debug)]
pub(crate) struct BitSet {
    size:usize,
    bytes:Vec<u8>
}

impl BitSet {
    pub(crate) fn new() -> Self {
        Self {size:0,bytes:vec![]}
    }
    pub(crate) fn zeros(size:usize) -> Self {
        if size == 0 {return Self::new()}
        Self {
            size,
            bytes:vec![0;size/8 + 1]
        }
    }
    // out of range reads as false
    pub(crate) fn get_at(&self,index:usize) -> bool {
        if index >= self.size {return false}
        let byte_pos = index / 8;
        let pos_in_byte = index % 8;
        let mask = 1u8 << pos_in_byte;
        self.bytes.get(byte_pos).is_some_and(|byte| *byte & mask > 0)
    }
    pub(crate) fn store_at(&mut self,index:usize,bit:bool) -> Option<()> {
        if index >= self.size {return None}
        let byte_pos = index / 8;
        let pos_in_byte = index % 8;
        let byte = self.bytes.get_mut(byte_pos)?;
        let mask = 1u8 << pos_in_byte;
        if bit {
            *byte |= mask;
        }else{
            *byte &= !mask;
        }
        Some(())
    }
}

impl Default for BitSet {
    fn default() -> Self {
        Self::new()
    }
}
