use thiserror::Error;

use crate::gfx::RendererType;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Attrib {
    Position,
    Normal,
    Color0,
    TexCoord0,
}

impl Attrib {
    /// Shader input location the attribute is bound to.
    pub const fn location(self) -> u32 {
        match self {
            Attrib::Position => 0,
            Attrib::Color0 => 1,
            Attrib::TexCoord0 => 2,
            Attrib::Normal => 3,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AttribType {
    Uint8,
    Int16,
    Half,
    Float,
}

impl AttribType {
    pub const fn size(self) -> u16 {
        match self {
            AttribType::Uint8 => 1,
            AttribType::Int16 | AttribType::Half => 2,
            AttribType::Float => 4,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub attrib: Attrib,
    pub num: u8,
    pub ty: AttribType,
    pub normalized: bool,
    pub offset: u16,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VertexLayoutError {
    #[error("vertex layout has no attributes")]
    Empty,
    #[error("{0:?} added more than once")]
    Duplicate(Attrib),
    #[error("{attrib:?} has {num} components, expected 1..=4")]
    ComponentCount { attrib: Attrib, num: u8 },
}

/// Finished vertex layout. Only [`VertexLayoutBuilder::end`] produces one, so
/// holding a `VertexLayout` means the attribute list was validated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    attributes: Vec<VertexAttribute>,
    stride: u16,
}

impl VertexLayout {
    pub fn begin(renderer: RendererType) -> VertexLayoutBuilder {
        VertexLayoutBuilder {
            renderer,
            attributes: Vec::new(),
            stride: 0,
        }
    }

    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }

    pub fn stride(&self) -> u16 {
        self.stride
    }
}

#[derive(Debug)]
pub struct VertexLayoutBuilder {
    renderer: RendererType,
    attributes: Vec<VertexAttribute>,
    stride: u16,
}

impl VertexLayoutBuilder {
    pub fn add(mut self, attrib: Attrib, num: u8, ty: AttribType, normalized: bool) -> Self {
        self.attributes.push(VertexAttribute {
            attrib,
            num,
            ty,
            normalized,
            offset: self.stride,
        });
        self.stride = self.stride.saturating_add(u16::from(num).saturating_mul(ty.size()));
        self
    }

    pub fn end(self) -> Result<VertexLayout, VertexLayoutError> {
        if self.attributes.is_empty() {
            return Err(VertexLayoutError::Empty);
        }
        for (i, attr) in self.attributes.iter().enumerate() {
            if !(1..=4).contains(&attr.num) {
                return Err(VertexLayoutError::ComponentCount {
                    attrib: attr.attrib,
                    num: attr.num,
                });
            }
            if self.attributes[..i].iter().any(|a| a.attrib == attr.attrib) {
                return Err(VertexLayoutError::Duplicate(attr.attrib));
            }
        }
        log::trace!(
            "Vertex layout for {:?}: {} attributes, stride {}",
            self.renderer,
            self.attributes.len(),
            self.stride
        );
        Ok(VertexLayout {
            attributes: self.attributes,
            stride: self.stride,
        })
    }
}
