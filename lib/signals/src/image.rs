use strata_core::{DataType, Field, Item, Result, Signal, SignalDescriptor, SignalInputType};

pub const BYTE_LENGTH: &str = "byte_length";

/// Size in bytes of a binary value.
pub struct ByteLength {
    descriptor: SignalDescriptor,
}

impl ByteLength {
    pub fn new() -> Self {
        Self {
            descriptor: SignalDescriptor::new(BYTE_LENGTH),
        }
    }

    pub fn create(descriptor: &SignalDescriptor) -> Result<Box<dyn Signal>> {
        Ok(Box::new(Self {
            descriptor: descriptor.clone(),
        }))
    }
}

impl Default for ByteLength {
    fn default() -> Self {
        Self::new()
    }
}

impl Signal for ByteLength {
    fn name(&self) -> &str {
        BYTE_LENGTH
    }

    fn input_type(&self) -> SignalInputType {
        SignalInputType::Image
    }

    fn fields(&self) -> Field {
        Field::leaf(DataType::Int64)
    }

    fn descriptor(&self) -> SignalDescriptor {
        self.descriptor.clone()
    }

    fn compute(&self, data: &[Item]) -> Result<Vec<Option<Item>>> {
        Ok(data
            .iter()
            .map(|item| item.as_bytes().map(|bytes| Item::Int(bytes.len() as i64)))
            .collect())
    }
}
