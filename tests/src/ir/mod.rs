mod analysis;
mod module_json;
