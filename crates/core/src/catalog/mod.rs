pub mod schema;

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

use crate::domain::*;
use crate::error::{Error, Result};
use crate::metadata::Orientation;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite-backed store for images and the facts attached to them.
///
/// Every mutation of an image's facts flags the image dirty; only
/// [`Catalog::mark_clean_batch`] and [`Catalog::mark_clean`] clear it.
pub struct Catalog {
    conn: Connection,
}

impl Catalog {
    /// Open or create a catalog at the given path with WAL mode.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory catalog (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    /// Run `f` inside one transaction, rolled back if it returns an error.
    pub fn in_transaction<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        let tx = self.conn.unchecked_transaction()?;
        let value = f(self)?;
        tx.commit()?;
        Ok(value)
    }

    // ── Images ───────────────────────────────────────────────────────

    /// Insert a freshly indexed image. New images start clean.
    pub fn insert_image(&self, image: &NewImage) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO images (path, source, checksum, file_size, width, height, orientation, description, is_dirty)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0)",
            params![
                image.path.to_string_lossy().as_ref(),
                image.source,
                image.checksum,
                image.file_size as i64,
                image.width,
                image.height,
                u8::from(image.orientation),
                image.description,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn find_image_by_checksum(&self, checksum: &str) -> Result<Option<i64>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id FROM images WHERE checksum = ?1 ORDER BY id LIMIT 1",
                params![checksum],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn update_image_path(&self, image_id: i64, path: &Path) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE images SET path = ?1 WHERE id = ?2",
            params![path.to_string_lossy().as_ref(), image_id],
        )?;
        expect_image(changed, image_id)
    }

    pub fn update_image_source(&self, image_id: i64, source: Option<&str>) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE images SET source = ?1 WHERE id = ?2",
            params![source, image_id],
        )?;
        expect_image(changed, image_id)
    }

    pub fn set_description(&self, image_id: i64, description: Option<&str>) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE images SET description = ?1, is_dirty = 1 WHERE id = ?2",
            params![description, image_id],
        )?;
        expect_image(changed, image_id)
    }

    pub fn set_orientation(&self, image_id: i64, orientation: Orientation) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE images SET orientation = ?1, is_dirty = 1 WHERE id = ?2",
            params![u8::from(orientation), image_id],
        )?;
        expect_image(changed, image_id)
    }

    pub fn set_location(&self, image_id: i64, location_id: Option<i64>) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE images SET location_id = ?1, is_dirty = 1 WHERE id = ?2",
            params![location_id, image_id],
        )?;
        expect_image(changed, image_id)
    }

    pub fn set_date(&self, image_id: i64, date_id: Option<i64>) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE images SET date_id = ?1, is_dirty = 1 WHERE id = ?2",
            params![date_id, image_id],
        )?;
        expect_image(changed, image_id)
    }

    pub fn mark_dirty(&self, image_id: i64) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE images SET is_dirty = 1 WHERE id = ?1",
            params![image_id],
        )?;
        expect_image(changed, image_id)
    }

    pub fn mark_clean(&self, image_id: i64) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE images SET is_dirty = 0 WHERE id = ?1",
            params![image_id],
        )?;
        expect_image(changed, image_id)
    }

    /// Clear the dirty flag and store the refreshed checksum of every
    /// image, all or nothing.
    pub fn mark_clean_batch(&self, images: &[(i64, String)]) -> Result<()> {
        self.in_transaction(|catalog| {
            let mut stmt = catalog
                .conn
                .prepare("UPDATE images SET checksum = ?1, is_dirty = 0 WHERE id = ?2")?;
            for (image_id, checksum) in images {
                let changed = stmt.execute(params![checksum, image_id])?;
                expect_image(changed, *image_id)?;
            }
            Ok(())
        })
    }

    pub fn dirty_image_ids(&self) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM images WHERE is_dirty = 1 ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    pub fn list_image_ids(&self) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare("SELECT id FROM images ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Load an image with its location, date, and every face and pet box.
    pub fn load_image(&self, image_id: i64) -> Result<ImageRecord> {
        let row = self
            .conn
            .query_row(
                "SELECT path, source, checksum, file_size, width, height, orientation, description,
                        location_id, date_id, is_dirty
                 FROM images WHERE id = ?1",
                params![image_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, Option<u32>>(4)?,
                        row.get::<_, Option<u32>>(5)?,
                        row.get::<_, i64>(6)?,
                        row.get::<_, Option<String>>(7)?,
                        row.get::<_, Option<i64>>(8)?,
                        row.get::<_, Option<i64>>(9)?,
                        row.get::<_, bool>(10)?,
                    ))
                },
            )
            .optional()?
            .ok_or(Error::ImageNotFound(image_id))?;

        let (path, source, checksum, file_size, width, height, orientation, description, location_id, date_id, is_dirty) =
            row;

        let location = location_id.map(|id| self.load_location(id)).transpose()?;
        let date = date_id.map(|id| self.load_date(id)).transpose()?;

        Ok(ImageRecord {
            id: image_id,
            path: PathBuf::from(path),
            source,
            checksum,
            file_size: file_size as u64,
            width,
            height,
            orientation: u8::try_from(orientation)
                .ok()
                .and_then(|value| Orientation::try_from(value).ok())
                .unwrap_or_default(),
            description,
            location,
            date,
            faces: self.face_boxes(image_id)?,
            pets: self.pet_boxes(image_id)?,
            is_dirty,
        })
    }

    // ── People & pets ────────────────────────────────────────────────

    pub fn get_or_create_person(&self, name: &str) -> Result<Person> {
        self.conn.execute(
            "INSERT OR IGNORE INTO people (name) VALUES (?1)",
            params![name],
        )?;
        let person = self.conn.query_row(
            "SELECT id, name, description FROM people WHERE name = ?1",
            params![name],
            |row| {
                Ok(Person {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                })
            },
        )?;
        Ok(person)
    }

    pub fn get_or_create_pet(&self, name: &str) -> Result<Pet> {
        self.conn.execute(
            "INSERT OR IGNORE INTO pets (name) VALUES (?1)",
            params![name],
        )?;
        let pet = self.conn.query_row(
            "SELECT id, name, description FROM pets WHERE name = ?1",
            params![name],
            |row| {
                Ok(Pet {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                })
            },
        )?;
        Ok(pet)
    }

    /// Returns whether the description was stored; an existing one is kept.
    pub fn set_person_description_if_empty(&self, person_id: i64, description: &str) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE people SET description = ?1 WHERE id = ?2 AND (description IS NULL OR description = '')",
            params![description, person_id],
        )?;
        Ok(changed > 0)
    }

    pub fn set_pet_description_if_empty(&self, pet_id: i64, description: &str) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE pets SET description = ?1 WHERE id = ?2 AND (description IS NULL OR description = '')",
            params![description, pet_id],
        )?;
        Ok(changed > 0)
    }

    pub fn add_person_box(&self, image_id: i64, person_id: i64, bbox: &BoundingBox) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO person_in_image (person_id, image_id, center_x, center_y, width, height)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![person_id, image_id, bbox.center_x, bbox.center_y, bbox.width, bbox.height],
        )?;
        let box_id = self.conn.last_insert_rowid();
        self.mark_dirty(image_id)?;
        Ok(box_id)
    }

    pub fn add_pet_box(
        &self,
        image_id: i64,
        pet_id: i64,
        bbox: &BoundingBox,
        description: Option<&str>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO pet_in_image (pet_id, image_id, center_x, center_y, width, height, description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![pet_id, image_id, bbox.center_x, bbox.center_y, bbox.width, bbox.height, description],
        )?;
        let box_id = self.conn.last_insert_rowid();
        self.mark_dirty(image_id)?;
        Ok(box_id)
    }

    pub fn remove_person_box(&self, box_id: i64) -> Result<()> {
        let image_id: Option<i64> = self
            .conn
            .query_row(
                "DELETE FROM person_in_image WHERE id = ?1 RETURNING image_id",
                params![box_id],
                |row| row.get(0),
            )
            .optional()?;
        match image_id {
            Some(image_id) => self.mark_dirty(image_id),
            None => Ok(()),
        }
    }

    pub fn remove_pet_box(&self, box_id: i64) -> Result<()> {
        let image_id: Option<i64> = self
            .conn
            .query_row(
                "DELETE FROM pet_in_image WHERE id = ?1 RETURNING image_id",
                params![box_id],
                |row| row.get(0),
            )
            .optional()?;
        match image_id {
            Some(image_id) => self.mark_dirty(image_id),
            None => Ok(()),
        }
    }

    fn face_boxes(&self, image_id: i64) -> Result<Vec<FaceBox>> {
        let mut stmt = self.conn.prepare(
            "SELECT b.id, p.id, p.name, p.description, b.center_x, b.center_y, b.width, b.height
             FROM person_in_image b
             JOIN people p ON p.id = b.person_id
             WHERE b.image_id = ?1
             ORDER BY b.id",
        )?;
        let boxes = stmt
            .query_map(params![image_id], |row| {
                Ok(FaceBox {
                    id: row.get(0)?,
                    person: Person {
                        id: row.get(1)?,
                        name: row.get(2)?,
                        description: row.get(3)?,
                    },
                    bbox: BoundingBox {
                        center_x: row.get(4)?,
                        center_y: row.get(5)?,
                        width: row.get(6)?,
                        height: row.get(7)?,
                    },
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(boxes)
    }

    fn pet_boxes(&self, image_id: i64) -> Result<Vec<PetBox>> {
        let mut stmt = self.conn.prepare(
            "SELECT b.id, p.id, p.name, p.description, b.center_x, b.center_y, b.width, b.height, b.description
             FROM pet_in_image b
             JOIN pets p ON p.id = b.pet_id
             WHERE b.image_id = ?1
             ORDER BY b.id",
        )?;
        let boxes = stmt
            .query_map(params![image_id], |row| {
                Ok(PetBox {
                    id: row.get(0)?,
                    pet: Pet {
                        id: row.get(1)?,
                        name: row.get(2)?,
                        description: row.get(3)?,
                    },
                    bbox: BoundingBox {
                        center_x: row.get(4)?,
                        center_y: row.get(5)?,
                        width: row.get(6)?,
                        height: row.get(7)?,
                    },
                    description: row.get(8)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(boxes)
    }

    // ── Locations & dates ────────────────────────────────────────────

    /// Find the location with the same four fields, or insert it. Missing
    /// fields compare equal to each other.
    pub fn get_or_create_location(&self, location: &RoughLocation) -> Result<i64> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM rough_locations
                 WHERE country_code = ?1 AND subdivision_code IS ?2 AND city IS ?3 AND sub_location IS ?4",
                params![
                    location.country_code(),
                    location.subdivision_code(),
                    location.city(),
                    location.sub_location(),
                ],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }

        self.conn.execute(
            "INSERT INTO rough_locations (country_code, subdivision_code, city, sub_location)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                location.country_code(),
                location.subdivision_code(),
                location.city(),
                location.sub_location(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn load_location(&self, location_id: i64) -> Result<RoughLocation> {
        let (country_code, subdivision_code, city, sub_location): (String, Option<String>, Option<String>, Option<String>) =
            self.conn.query_row(
                "SELECT country_code, subdivision_code, city, sub_location FROM rough_locations WHERE id = ?1",
                params![location_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;
        RoughLocation::new(&country_code, subdivision_code.as_deref(), city, sub_location)
    }

    pub fn get_or_create_date(&self, date: &RoughDate) -> Result<i64> {
        let date_str = date.date().format(DATE_FORMAT).to_string();
        self.conn.execute(
            "INSERT OR IGNORE INTO rough_dates (date, month_valid, day_valid) VALUES (?1, ?2, ?3)",
            params![date_str, date.month_valid(), date.day_valid()],
        )?;
        let id = self.conn.query_row(
            "SELECT id FROM rough_dates WHERE date = ?1 AND month_valid = ?2 AND day_valid = ?3",
            params![date_str, date.month_valid(), date.day_valid()],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn load_date(&self, date_id: i64) -> Result<RoughDate> {
        let (date, month_valid, day_valid): (String, bool, bool) = self.conn.query_row(
            "SELECT date, month_valid, day_valid FROM rough_dates WHERE id = ?1",
            params![date_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        let date = NaiveDate::parse_from_str(&date, DATE_FORMAT)
            .map_err(|_| Error::InvalidRoughDate)?;
        RoughDate::new(date, month_valid, day_valid)
    }

    // ── Tags ─────────────────────────────────────────────────────────

    pub fn get_or_create_tag(&self, name: &str, parent_id: Option<i64>) -> Result<i64> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM tags WHERE name = ?1 AND parent_id IS ?2",
                params![name, parent_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }

        self.conn.execute(
            "INSERT INTO tags (name, parent_id) VALUES (?1, ?2)",
            params![name, parent_id],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn tag_image(&self, tag_id: i64, image_id: i64, applied: bool) -> Result<()> {
        self.conn.execute(
            "INSERT INTO tag_on_image (tag_id, image_id, applied) VALUES (?1, ?2, ?3)
             ON CONFLICT (tag_id, image_id) DO UPDATE SET applied = excluded.applied",
            params![tag_id, image_id, applied],
        )?;
        self.mark_dirty(image_id)
    }

    /// Full `parent|child` path of every tag on an image, with its applied
    /// flag, sorted by path.
    pub fn image_tags(&self, image_id: i64) -> Result<Vec<(String, bool)>> {
        let mut stmt = self.conn.prepare(
            "WITH RECURSIVE tag_path(id, path) AS (
                 SELECT id, name FROM tags WHERE parent_id IS NULL
                 UNION ALL
                 SELECT t.id, tag_path.path || '|' || t.name
                 FROM tags t JOIN tag_path ON t.parent_id = tag_path.id
             )
             SELECT tag_path.path, toi.applied
             FROM tag_on_image toi
             JOIN tag_path ON tag_path.id = toi.tag_id
             WHERE toi.image_id = ?1
             ORDER BY tag_path.path",
        )?;
        let tags = stmt
            .query_map(params![image_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    // ── Stats ────────────────────────────────────────────────────────

    pub fn stats(&self) -> Result<ArchiveStats> {
        let stats = self.conn.query_row(
            "SELECT
                (SELECT COUNT(*) FROM images),
                (SELECT COUNT(*) FROM images WHERE is_dirty = 1),
                (SELECT COUNT(*) FROM people),
                (SELECT COUNT(*) FROM pets),
                (SELECT COUNT(*) FROM rough_locations),
                (SELECT COUNT(*) FROM rough_dates),
                (SELECT COUNT(*) FROM tags)",
            [],
            |row| {
                Ok(ArchiveStats {
                    total_images: row.get::<_, i64>(0)? as usize,
                    dirty_images: row.get::<_, i64>(1)? as usize,
                    people: row.get::<_, i64>(2)? as usize,
                    pets: row.get::<_, i64>(3)? as usize,
                    locations: row.get::<_, i64>(4)? as usize,
                    dates: row.get::<_, i64>(5)? as usize,
                    tags: row.get::<_, i64>(6)? as usize,
                })
            },
        )?;
        Ok(stats)
    }
}

fn expect_image(changed: usize, image_id: i64) -> Result<()> {
    if changed == 0 {
        return Err(Error::ImageNotFound(image_id));
    }
    Ok(())
}
