use super::{
    booking,
    home::{self, NewHome},
    session::{self, SessionData},
    user::{self, NewUser},
    Booking, Home, Session, User,
};
use log::{debug, info, trace};
use rusqlite::{
    types::Type, Connection, OptionalExtension, Result as SqlResult, Row,
};

type Result<T> = SqlResult<Option<T>>;

pub struct Database {
    conn: Connection,
}

/// Build the database.
impl Database {
    pub fn open(path: &str) -> SqlResult<Database> {
        let conn = Connection::open(path)?;
        trace!("Opened database connection to {}", path);
        Database::init_db(conn)
    }

    pub fn open_in_memory() -> SqlResult<Database> {
        Database::init_db(Connection::open_in_memory()?)
    }

    fn init_db(conn: Connection) -> SqlResult<Database> {
        trace!("Initializing database...");

        conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS users (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                first_name TEXT NOT NULL,
                last_name  TEXT NOT NULL,
                email      TEXT NOT NULL UNIQUE,
                password   TEXT NOT NULL,
                user_type  TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS homes (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                host        INTEGER NOT NULL,
                name        TEXT NOT NULL,
                price       REAL NOT NULL,
                location    TEXT NOT NULL,
                rating      REAL NOT NULL,
                photo       TEXT,
                description TEXT NOT NULL,
                FOREIGN KEY(host) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS favourites (
                user INTEGER NOT NULL,
                home INTEGER NOT NULL,
                PRIMARY KEY(user, home),
                FOREIGN KEY(user) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY(home) REFERENCES homes(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS bookings (
                id      INTEGER PRIMARY KEY AUTOINCREMENT,
                user    INTEGER NOT NULL,
                home    INTEGER NOT NULL,
                created INTEGER NOT NULL,
                FOREIGN KEY(user) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY(home) REFERENCES homes(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS sessions (
                id      TEXT PRIMARY KEY,
                expires INTEGER NOT NULL,
                data    TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS sessions_expires ON sessions(expires);",
        )?;

        info!("Finished initializing database");

        Ok(Database { conn })
    }
}

/// User stuff
impl Database {
    pub fn add_user(&self, user: &NewUser) -> SqlResult<user::Id> {
        debug!("Adding user {:?} to database", user);
        self.conn.execute(
            "INSERT INTO users (first_name, last_name, email, password, user_type)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            (
                &user.first_name,
                &user.last_name,
                &user.email,
                &user.password,
                user.user_type.as_str(),
            ),
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_user(&self, id: user::Id) -> Result<User> {
        debug!("Getting user {}", id);
        self.conn
            .query_row(
                "SELECT id, first_name, last_name, email, password, user_type
                 FROM users WHERE id=?1",
                (id,),
                map_user,
            )
            .optional()
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<User> {
        debug!("Getting user (email: {})", email);
        self.conn
            .query_row(
                "SELECT id, first_name, last_name, email, password, user_type
                 FROM users WHERE email=?1",
                (email,),
                map_user,
            )
            .optional()
    }
}

/// Home stuff
impl Database {
    pub fn add_home(&self, home: &NewHome) -> SqlResult<home::Id> {
        debug!("Adding home {:?} for host {}", home.name, home.host);
        self.conn.execute(
            "INSERT INTO homes (host, name, price, location, rating, photo, description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            (
                home.host,
                &home.name,
                home.price,
                &home.location,
                home.rating,
                &home.photo,
                &home.description,
            ),
        )?;
        let id = self.conn.last_insert_rowid();
        info!("Created home {}: {}", id, home.name);
        Ok(id)
    }

    pub fn get_home(&self, id: home::Id) -> Result<Home> {
        debug!("Getting home {}", id);
        self.conn
            .query_row(
                "SELECT id, host, name, price, location, rating, photo, description
                 FROM homes WHERE id=?1",
                (id,),
                map_home,
            )
            .optional()
    }

    pub fn get_homes(&self) -> SqlResult<Vec<Home>> {
        trace!("Getting all homes");
        let mut stmt = self.conn.prepare(
            "SELECT id, host, name, price, location, rating, photo, description
             FROM homes ORDER BY id",
        )?;
        let homes = stmt.query_map((), map_home)?.collect();
        homes
    }

    pub fn get_homes_by_host(&self, host: user::Id) -> SqlResult<Vec<Home>> {
        trace!("Getting homes of host {}", host);
        let mut stmt = self.conn.prepare(
            "SELECT id, host, name, price, location, rating, photo, description
             FROM homes WHERE host=?1 ORDER BY id",
        )?;
        let homes = stmt.query_map((host,), map_home)?.collect();
        homes
    }

    /// Returns `false` if there was no such home.
    pub fn update_home(&self, home: &Home) -> SqlResult<bool> {
        debug!("Updating home {}", home.id);
        let changed = self.conn.execute(
            "UPDATE homes SET name=?2, price=?3, location=?4, rating=?5, photo=?6, description=?7
             WHERE id=?1",
            (
                home.id,
                &home.name,
                home.price,
                &home.location,
                home.rating,
                &home.photo,
                &home.description,
            ),
        )?;
        Ok(changed > 0)
    }

    pub fn delete_home(&self, id: home::Id) -> SqlResult<bool> {
        debug!("Deleting home {}", id);
        let changed = self.conn.execute("DELETE FROM homes WHERE id=?1", (id,))?;
        Ok(changed > 0)
    }
}

/// Favourites and bookings
impl Database {
    pub fn add_favourite(&self, user: user::Id, home: home::Id) -> SqlResult<()> {
        debug!("User {} favourited home {}", user, home);
        self.conn.execute(
            "INSERT OR IGNORE INTO favourites (user, home) VALUES (?1, ?2)",
            (user, home),
        )?;
        Ok(())
    }

    pub fn remove_favourite(&self, user: user::Id, home: home::Id) -> SqlResult<()> {
        debug!("User {} dropped favourite {}", user, home);
        self.conn.execute(
            "DELETE FROM favourites WHERE user=?1 AND home=?2",
            (user, home),
        )?;
        Ok(())
    }

    pub fn get_favourites(&self, user: user::Id) -> SqlResult<Vec<Home>> {
        let mut stmt = self.conn.prepare(
            "SELECT h.id, h.host, h.name, h.price, h.location, h.rating, h.photo, h.description
             FROM favourites f JOIN homes h ON h.id = f.home
             WHERE f.user=?1 ORDER BY h.id",
        )?;
        let homes = stmt.query_map((user,), map_home)?.collect();
        homes
    }

    pub fn add_booking(
        &self,
        user: user::Id,
        home: home::Id,
        created: i64,
    ) -> SqlResult<booking::Id> {
        debug!("User {} booked home {}", user, home);
        self.conn.execute(
            "INSERT INTO bookings (user, home, created) VALUES (?1, ?2, ?3)",
            (user, home, created),
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_bookings(&self, user: user::Id) -> SqlResult<Vec<Booking>> {
        let mut stmt = self.conn.prepare(
            "SELECT h.id, h.host, h.name, h.price, h.location, h.rating, h.photo, h.description,
                    b.id, b.created
             FROM bookings b JOIN homes h ON h.id = b.home
             WHERE b.user=?1 ORDER BY b.id DESC",
        )?;
        let bookings = stmt
            .query_map((user,), |row| {
                Ok(Booking {
                    home: map_home(row)?,
                    id: row.get(8)?,
                    created: row.get(9)?,
                })
            })?
            .collect();
        bookings
    }
}

/// Session stuff
impl Database {
    pub fn get_session(&self, id: &session::Id) -> Result<Session> {
        trace!("Getting session {}", id);
        self.conn
            .query_row(
                "SELECT id, expires, data FROM sessions WHERE id=?1",
                (id,),
                |row| {
                    let data: String = row.get(2)?;
                    let data: SessionData = serde_json::from_str(&data).map_err(|err| {
                        rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(err))
                    })?;
                    Ok(Session {
                        id: row.get(0)?,
                        expires: row.get(1)?,
                        data,
                    })
                },
            )
            .optional()
    }

    /// Insert or overwrite a session. The last write wins.
    pub fn put_session(&self, session: &Session) -> SqlResult<()> {
        trace!("Saving session {}", session.id);
        let data = serde_json::to_string(&session.data)
            .map_err(|err| rusqlite::Error::ToSqlConversionFailure(Box::new(err)))?;
        self.conn.execute(
            "INSERT INTO sessions (id, expires, data) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET expires=excluded.expires, data=excluded.data",
            (&session.id, session.expires, data),
        )?;
        Ok(())
    }

    pub fn delete_session(&self, id: &session::Id) -> SqlResult<()> {
        debug!("Deleting session {}", id);
        self.conn
            .execute("DELETE FROM sessions WHERE id=?1", (id,))?;
        Ok(())
    }
    /// Delete every session that expired at or before `now`.
    pub fn delete_expired_sessions(&self, now: i64) -> SqlResult<usize> {
        let deleted = self
            .conn
            .execute("DELETE FROM sessions WHERE expires <= ?1", (now,))?;
        if deleted > 0 {
            debug!("Swept {} expired sessions", deleted);
        }
        Ok(deleted)
    }
}

fn map_user(row: &Row) -> SqlResult<User> {
    let user_type: String = row.get(5)?;
    let user_type = user_type.parse().map_err(|()| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            Type::Text,
            format!("unknown user type {}", user_type).into(),
        )
    })?;

    Ok(User {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        email: row.get(3)?,
        password: row.get(4)?,
        user_type,
    })
}

fn map_home(row: &Row) -> SqlResult<Home> {
    Ok(Home {
        id: row.get(0)?,
        host: row.get(1)?,
        name: row.get(2)?,
        price: row.get(3)?,
        location: row.get(4)?,
        rating: row.get(5)?,
        photo: row.get(6)?,
        description: row.get(7)?,
    })
}
