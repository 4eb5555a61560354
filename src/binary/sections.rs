//! Top-level section parsing: magic/version header, section headers, and
//! payload decoders producing the `Section` stream the assembler folds.

use super::{
    cursor::Cursor,
    instr, leb128,
    reader::{self, read_byte_vec, read_name, read_vec},
    BinaryReadError, Result,
};
use crate::model::{
    DataSegment, ElementSegment, Export, ExportDesc, FuncBody, Global, Import, ImportDesc,
    LocalDecl, Section,
};

const MAGIC: u32 = 0x6D73_6100; // "\0asm"
const VERSION: u32 = 0x0000_0001;

/// Standard section identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionId {
    Custom = 0,
    Type = 1,
    Import = 2,
    Function = 3,
    Table = 4,
    Memory = 5,
    Global = 6,
    Export = 7,
    Start = 8,
    Element = 9,
    Code = 10,
    Data = 11,
}

impl SectionId {
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0 => SectionId::Custom,
            1 => SectionId::Type,
            2 => SectionId::Import,
            3 => SectionId::Function,
            4 => SectionId::Table,
            5 => SectionId::Memory,
            6 => SectionId::Global,
            7 => SectionId::Export,
            8 => SectionId::Start,
            9 => SectionId::Element,
            10 => SectionId::Code,
            11 => SectionId::Data,
            _ => return None,
        })
    }
}

fn read_import(cur: &mut Cursor) -> Result<Import> {
    let module = read_name(cur)?;
    let name = read_name(cur)?;
    let desc = match cur.read_u8()? {
        0x00 => ImportDesc::Func(leb128::read_uleb_u32(cur)?),
        0x01 => ImportDesc::Table(reader::read_table_type(cur)?),
        0x02 => ImportDesc::Memory(reader::read_memory_type(cur)?),
        0x03 => ImportDesc::Global(reader::read_global_type(cur)?),
        _ => {
            return Err(BinaryReadError::Malformed {
                offset: cur.offset(),
                msg: "invalid import descriptor tag",
            })
        }
    };
    Ok(Import { module, name, desc })
}

fn read_export(cur: &mut Cursor) -> Result<Export> {
    let name = read_name(cur)?;
    let desc = match cur.read_u8()? {
        0x00 => ExportDesc::Func(leb128::read_uleb_u32(cur)?),
        0x01 => ExportDesc::Table(leb128::read_uleb_u32(cur)?),
        0x02 => ExportDesc::Memory(leb128::read_uleb_u32(cur)?),
        0x03 => ExportDesc::Global(leb128::read_uleb_u32(cur)?),
        _ => {
            return Err(BinaryReadError::Malformed {
                offset: cur.offset(),
                msg: "invalid export descriptor tag",
            })
        }
    };
    Ok(Export { name, desc })
}

fn read_global(cur: &mut Cursor) -> Result<Global> {
    Ok(Global {
        ty: reader::read_global_type(cur)?,
        init: instr::read_expr(cur)?,
    })
}

fn read_element_segment(cur: &mut Cursor) -> Result<ElementSegment> {
    Ok(ElementSegment {
        table: leb128::read_uleb_u32(cur)?,
        offset: instr::read_expr(cur)?,
        init: read_vec(cur, leb128::read_uleb_u32)?,
    })
}

fn read_data_segment(cur: &mut Cursor) -> Result<DataSegment> {
    Ok(DataSegment {
        memory: leb128::read_uleb_u32(cur)?,
        offset: instr::read_expr(cur)?,
        init: read_byte_vec(cur)?,
    })
}

/// One size-prefixed code entry: local groups, then the instruction stream.
fn read_func_body(cur: &mut Cursor) -> Result<FuncBody> {
    let size = leb128::read_uleb_u32(cur)? as usize;
    let bytes = cur.read_bytes(size)?;
    let mut body_cur = Cursor::new(bytes);

    let locals = read_vec(&mut body_cur, |c| {
        Ok(LocalDecl {
            count: leb128::read_uleb_u32(c)?,
            val_type: reader::read_val_type(c)?,
        })
    })?;
    let body = instr::read_expr(&mut body_cur)?;
    if !body_cur.is_eof() {
        return Err(BinaryReadError::Malformed {
            offset: body_cur.offset(),
            msg: "code entry not fully consumed",
        });
    }
    Ok(FuncBody { locals, body })
}

/// Decode a whole module into its ordered section stream.
///
/// Enforces the header, section ordering (non-decreasing ids, custom
/// sections anywhere), at-most-once standard sections, and full payload
/// consumption. Custom sections are retained with their payloads.
pub fn decode_sections(bytes: &[u8]) -> Result<Vec<Section>> {
    let mut cur = Cursor::new(bytes);

    if cur.read_u32_le()? != MAGIC {
        return Err(BinaryReadError::Malformed {
            offset: 0,
            msg: "bad magic header",
        });
    }
    if cur.read_u32_le()? != VERSION {
        return Err(BinaryReadError::Malformed {
            offset: 4,
            msg: "unsupported version",
        });
    }

    let mut sections = Vec::new();
    let mut seen = [false; 12];
    let mut last_key = 0u8;

    while !cur.is_eof() {
        let at = cur.offset();
        let id = SectionId::from_byte(cur.read_u8()?).ok_or(BinaryReadError::Malformed {
            offset: at,
            msg: "unknown section id",
        })?;
        let payload_len = leb128::read_uleb_u32(&mut cur)? as usize;
        let payload = cur.read_bytes(payload_len)?;
        let mut pcur = Cursor::new(payload);

        if id == SectionId::Custom {
            let name = read_name(&mut pcur)?;
            let rest = pcur.read_bytes(pcur.remaining())?.to_vec();
            sections.push(Section::Custom { name, bytes: rest });
            continue;
        }

        let key = id as u8;
        if key < last_key {
            return Err(BinaryReadError::Malformed {
                offset: at,
                msg: "section out of order",
            });
        }
        last_key = key;
        if seen[key as usize] {
            return Err(BinaryReadError::Malformed {
                offset: at,
                msg: "duplicate standard section",
            });
        }
        seen[key as usize] = true;

        let section = match id {
            SectionId::Type => Section::Types(read_vec(&mut pcur, |c| {
                let form = c.read_u8()?;
                if form != 0x60 {
                    return Err(BinaryReadError::Malformed {
                        offset: c.offset(),
                        msg: "expected functype (0x60)",
                    });
                }
                Ok(crate::model::FuncType {
                    params: read_vec(c, reader::read_val_type)?,
                    results: read_vec(c, reader::read_val_type)?,
                })
            })?),
            SectionId::Import => Section::Imports(read_vec(&mut pcur, read_import)?),
            SectionId::Function => {
                Section::Functions(read_vec(&mut pcur, leb128::read_uleb_u32)?)
            }
            SectionId::Table => Section::Tables(read_vec(&mut pcur, reader::read_table_type)?),
            SectionId::Memory => {
                Section::Memories(read_vec(&mut pcur, reader::read_memory_type)?)
            }
            SectionId::Global => Section::Globals(read_vec(&mut pcur, read_global)?),
            SectionId::Export => Section::Exports(read_vec(&mut pcur, read_export)?),
            SectionId::Start => Section::Start(leb128::read_uleb_u32(&mut pcur)?),
            SectionId::Element => {
                Section::Elements(read_vec(&mut pcur, read_element_segment)?)
            }
            SectionId::Code => Section::Code(read_vec(&mut pcur, read_func_body)?),
            SectionId::Data => Section::Data(read_vec(&mut pcur, read_data_segment)?),
            SectionId::Custom => unreachable!(),
        };

        if !pcur.is_eof() {
            return Err(BinaryReadError::Malformed {
                offset: at,
                msg: "section payload not fully consumed",
            });
        }
        sections.push(section);
    }

    Ok(sections)
}
