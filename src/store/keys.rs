pub fn category_entities_key(category: &str) -> String {
    format!("isa:{}", category.to_lowercase())
}

pub fn concept_record_key(entity: &str) -> String {
    format!("concept:{}", entity.to_lowercase())
}
