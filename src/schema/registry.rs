//! Handler registry - maps each property type to its handler

use crate::entities::property::PropertyType;
use crate::schema::types::{
    BooleanHandler, DateHandler, EntityHandler, MediaHandler, NumberHandler, PropertyTypeHandler,
    SelectHandler, TextHandler, UnsupportedHandler,
};

static TEXT: TextHandler = TextHandler;
static NUMBER: NumberHandler = NumberHandler;
static DATE: DateHandler = DateHandler;
static BOOLEAN: BooleanHandler = BooleanHandler;
static SELECT: SelectHandler = SelectHandler;
static ENTITY: EntityHandler = EntityHandler;
static MEDIA: MediaHandler = MediaHandler;
static USER: UnsupportedHandler = UnsupportedHandler(PropertyType::User);
static ROLE: UnsupportedHandler = UnsupportedHandler(PropertyType::Role);
static FORMULA: UnsupportedHandler = UnsupportedHandler(PropertyType::Formula);

/// The handler for a property type
pub fn handler_for(ty: PropertyType) -> &'static dyn PropertyTypeHandler {
    match ty {
        PropertyType::Text => &TEXT,
        PropertyType::Number => &NUMBER,
        PropertyType::Date => &DATE,
        PropertyType::Boolean => &BOOLEAN,
        PropertyType::Select => &SELECT,
        PropertyType::Entity => &ENTITY,
        PropertyType::Media => &MEDIA,
        PropertyType::User => &USER,
        PropertyType::Role => &ROLE,
        PropertyType::Formula => &FORMULA,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::row::StorageSlot;

    #[test]
    fn test_every_type_has_matching_handler() {
        for ty in PropertyType::all() {
            assert_eq!(handler_for(*ty).property_type(), *ty);
        }
    }

    #[test]
    fn test_storage_slots() {
        assert_eq!(handler_for(PropertyType::Text).slot(), Some(StorageSlot::Text));
        assert_eq!(handler_for(PropertyType::Select).slot(), Some(StorageSlot::Id));
        assert_eq!(handler_for(PropertyType::Entity).slot(), Some(StorageSlot::Id));
        assert_eq!(handler_for(PropertyType::Media).slot(), Some(StorageSlot::Media));
        assert_eq!(handler_for(PropertyType::User).slot(), None);
        assert_eq!(handler_for(PropertyType::Formula).slot(), None);
    }
}
