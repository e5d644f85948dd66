//! Program images.
//!
//! An image is a flat sequence of little-endian 32-bit instruction words,
//! loaded at program address 0.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::instruction::Instruction;

/// Read every word from an image. A trailing partial word is an error.
pub fn read_image<R: Read>(mut reader: R) -> io::Result<Vec<u32>> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;

    if bytes.len() % 4 != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("program image length {} is not a multiple of 4", bytes.len()),
        ));
    }

    let mut cursor = io::Cursor::new(bytes);
    let mut words = Vec::with_capacity(cursor.get_ref().len() / 4);
    while (cursor.position() as usize) < cursor.get_ref().len() {
        words.push(cursor.read_u32::<LittleEndian>()?);
    }
    Ok(words)
}

/// Write the encoded program as an image.
pub fn write_image<W: Write>(writer: W, program: &[Instruction]) -> io::Result<()> {
    write_words(writer, &encode_program(program))
}

/// Write raw instruction words as an image.
pub fn write_words<W: Write>(mut writer: W, words: &[u32]) -> io::Result<()> {
    for &word in words {
        writer.write_u32::<LittleEndian>(word)?;
    }
    writer.flush()
}

/// Encode a program into words without going through I/O.
pub fn encode_program(program: &[Instruction]) -> Vec<u32> {
    program.iter().map(Instruction::encode).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let program = [Instruction::Const { rd: 1, imm: 7 }, Instruction::Ret];
        let mut buf = Vec::new();
        write_image(&mut buf, &program).unwrap();

        assert_eq!(buf.len(), 8);
        assert_eq!(&buf[4..8], &[0x00, 0x00, 0x00, 0xFC]);
        assert_eq!(read_image(buf.as_slice()).unwrap(), encode_program(&program));
    }

    #[test]
    fn test_truncated_image() {
        let err = read_image(&[0x01u8, 0x02, 0x03][..]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_empty_image() {
        assert!(read_image(&[0u8; 0][..]).unwrap().is_empty());
    }
}
