//! Destination endpoint URL builders

pub fn attribute_search_url(base_url: &str) -> String {
    format!("{}/attributes/restSearch", base_url)
}

pub fn event_search_url(base_url: &str) -> String {
    format!("{}/events/restSearch", base_url)
}

pub fn event_index_url(base_url: &str) -> String {
    format!("{}/events/index", base_url)
}

pub fn event_view_url(base_url: &str, uuid: &str) -> String {
    format!("{}/events/view/{}", base_url, uuid)
}

pub fn event_add_url(base_url: &str) -> String {
    format!("{}/events/add", base_url)
}

pub fn event_edit_url(base_url: &str, uuid: &str) -> String {
    format!("{}/events/edit/{}", base_url, uuid)
}

pub fn attribute_view_url(base_url: &str, uuid: &str) -> String {
    format!("{}/attributes/view/{}", base_url, uuid)
}

pub fn organisation_view_url(base_url: &str, id: &str) -> String {
    format!("{}/organisations/view/{}", base_url, id)
}

pub fn sighting_add_url(base_url: &str) -> String {
    format!("{}/sightings/add", base_url)
}

pub fn tag_attach_url(base_url: &str) -> String {
    format!("{}/tags/attachTagToObject", base_url)
}

pub fn tag_remove_url(base_url: &str) -> String {
    format!("{}/tags/removeTagFromObject", base_url)
}
