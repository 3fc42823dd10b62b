use std::path::Path;

use uuid::Uuid;

/// Persistent agent identity. If `agent.id` doesn't exist yet, generates
/// and saves a new UUID v4.
pub fn get_agent_id(base_dir: &Path) -> std::io::Result<Uuid> {
    let path = base_dir.join("agent.id");
    if let Ok(contents) = std::fs::read_to_string(&path) {
        let trimmed = contents.trim();
        if let Ok(id) = trimmed.parse() {
            return Ok(id);
        }
    }

    let id = Uuid::new_v4();
    std::fs::create_dir_all(base_dir)?;
    std::fs::write(&path, id.to_string())?;
    Ok(id)
}
