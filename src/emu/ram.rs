use crate::plat::{MAGIC, MEMORY_SIZE};

use super::{EmuError, EmuResult};

/// The machine's flat, byte addressed memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ram {
    pub memory: Box<[u8]>,
}

impl Ram {
    /// Creates a new [`Ram`] instance, allocating and initializing its memory to [0u8; 4096].
    pub fn new() -> Self {
        Self {
            memory: vec![0u8; MEMORY_SIZE].into_boxed_slice(),
        }
    }

    /// Copies everything after the magic tag of a binary image to address 0.
    ///
    /// # Errors
    ///
    /// This function will return an error if the image is larger than memory (tag included),
    /// or if it does not start with the magic tag.
    pub fn load(image: &[u8]) -> EmuResult<Self> {
        if image.len() > MEMORY_SIZE {
            return Err(EmuError::OversizedProgram { size: image.len() });
        }
        let program = image
            .strip_prefix(MAGIC.as_slice())
            .ok_or(EmuError::UnsupportedFormat)?;
        let mut ram = Self::new();
        ram.memory[..program.len()].copy_from_slice(program);
        Ok(ram)
    }

    pub fn read(&self, addr: usize) -> u8 {
        self.memory.get(addr).copied().unwrap_or(0)
    }

    pub fn write(&mut self, addr: usize, value: u8) {
        if let Some(byte) = self.memory.get_mut(addr) {
            *byte = value;
        }
    }

    /// Reads the little-endian word at `addr`. Bytes past the end of memory read as 0.
    pub fn read_word(&self, addr: usize) -> u16 {
        u16::from_le_bytes([self.read(addr), self.read(addr + 1)])
    }
}

impl Default for Ram {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load() {
        let ram = Ram::load(b".SLEDE8\x01\x05\x16").unwrap();
        assert_eq!(ram.memory.len(), MEMORY_SIZE);
        assert_eq!(&ram.memory[..4], [0x01, 0x05, 0x16, 0x00]);
        assert!(ram.memory[3..].iter().all(|&b| b == 0));
        assert_eq!(ram.read_word(0), 0x0501);
    }

    #[test]
    fn test_load_limits() {
        let mut image = MAGIC.to_vec();
        image.resize(MEMORY_SIZE, 0xc);
        assert!(Ram::load(&image).is_ok());
        image.push(0);
        assert_eq!(
            Ram::load(&image),
            Err(EmuError::OversizedProgram {
                size: MEMORY_SIZE + 1
            })
        );
    }

    #[test]
    fn test_load_bad_magic() {
        assert_eq!(Ram::load(b".SLEDE9\x00\x00"), Err(EmuError::UnsupportedFormat));
        assert_eq!(Ram::load(b".SLED"), Err(EmuError::UnsupportedFormat));
        assert_eq!(Ram::load(b""), Err(EmuError::UnsupportedFormat));
        assert!(Ram::load(MAGIC).is_ok());
    }

    #[test]
    fn test_read_word_at_end() {
        let mut ram = Ram::new();
        ram.write(MEMORY_SIZE - 1, 0xab);
        assert_eq!(ram.read_word(MEMORY_SIZE - 1), 0x00ab);
    }
}
