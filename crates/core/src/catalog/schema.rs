use rusqlite::Connection;

use crate::error::Result;

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS rough_locations (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            country_code      TEXT NOT NULL,
            subdivision_code  TEXT,
            city              TEXT,
            sub_location      TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_rough_locations_country ON rough_locations(country_code);

        CREATE TABLE IF NOT EXISTS rough_dates (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            date         TEXT NOT NULL,
            month_valid  INTEGER NOT NULL DEFAULT 0,
            day_valid    INTEGER NOT NULL DEFAULT 0,
            UNIQUE (date, month_valid, day_valid),
            CHECK (day_valid = 0 OR month_valid = 1)
        );

        CREATE TABLE IF NOT EXISTS images (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            path         TEXT NOT NULL,
            source       TEXT,
            checksum     TEXT NOT NULL,
            file_size    INTEGER NOT NULL,
            width        INTEGER,
            height       INTEGER,
            orientation  INTEGER NOT NULL DEFAULT 1,
            description  TEXT,
            location_id  INTEGER REFERENCES rough_locations(id),
            date_id      INTEGER REFERENCES rough_dates(id),
            is_dirty     INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_images_checksum ON images(checksum);
        CREATE INDEX IF NOT EXISTS idx_images_dirty ON images(is_dirty);

        CREATE TABLE IF NOT EXISTS people (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            name         TEXT NOT NULL UNIQUE,
            description  TEXT
        );

        CREATE TABLE IF NOT EXISTS pets (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            name         TEXT NOT NULL UNIQUE,
            description  TEXT
        );

        CREATE TABLE IF NOT EXISTS person_in_image (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            person_id  INTEGER NOT NULL REFERENCES people(id) ON DELETE CASCADE,
            image_id   INTEGER NOT NULL REFERENCES images(id) ON DELETE CASCADE,
            center_x   REAL NOT NULL,
            center_y   REAL NOT NULL,
            width      REAL NOT NULL,
            height     REAL NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_person_in_image_image ON person_in_image(image_id);

        CREATE TABLE IF NOT EXISTS pet_in_image (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            pet_id       INTEGER NOT NULL REFERENCES pets(id) ON DELETE CASCADE,
            image_id     INTEGER NOT NULL REFERENCES images(id) ON DELETE CASCADE,
            center_x     REAL NOT NULL,
            center_y     REAL NOT NULL,
            width        REAL NOT NULL,
            height       REAL NOT NULL,
            description  TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_pet_in_image_image ON pet_in_image(image_id);

        CREATE TABLE IF NOT EXISTS tags (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            name       TEXT NOT NULL,
            parent_id  INTEGER REFERENCES tags(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_tags_name_parent ON tags(name, parent_id);

        CREATE TABLE IF NOT EXISTS tag_on_image (
            tag_id    INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
            image_id  INTEGER NOT NULL REFERENCES images(id) ON DELETE CASCADE,
            applied   INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (tag_id, image_id)
        );
        ",
    )?;
    Ok(())
}
