//! The typed command catalogue.
//!
//! Every action is a thin adapter: a [`Cmd`] builder fixing the argument
//! list and reply shape, plus a [`Client`] method that processes it and
//! extracts the typed result. The wire mechanics all live in the client
//! core; nothing here touches a socket.

use crate::client::{Client, ConnClient};
use crate::command::Cmd;
use crate::error::Error;
use skyhash_proto::{Arg, Value};

fn status(args: Vec<Arg>) -> Cmd {
    Cmd::new_status(args)
}

fn int(args: Vec<Arg>) -> Cmd {
    Cmd::new_int(args)
}

fn text(args: Vec<Arg>) -> Cmd {
    Cmd::new_text(args)
}

fn text_slice(args: Vec<Arg>) -> Cmd {
    Cmd::new_text_slice(args)
}

fn slice(args: Vec<Arg>) -> Cmd {
    Cmd::new_slice(args)
}

fn pair_args(head: &str, pairs: impl IntoIterator<Item = (Arg, Arg)>) -> Vec<Arg> {
    let mut args = vec![Arg::from(head)];
    for (key, value) in pairs {
        args.push(key);
        args.push(value);
    }
    args
}

/// Builders for every catalogue command, usable directly when queueing
/// into a [`Pipeline`](crate::Pipeline) or via the [`Client`] methods.
impl Cmd {
    /// `HEYA [message]`: returns `HEY!` or echoes the message.
    pub fn heya(message: &str) -> Cmd {
        if message.is_empty() {
            text(vec![Arg::from("HEYA")])
        } else {
            text(vec![Arg::from("HEYA"), Arg::from(message)])
        }
    }

    /// `GET <key>`: the value of a key, or the nil sentinel.
    pub fn get(key: impl Into<Arg>) -> Cmd {
        text(vec![Arg::from("GET"), key.into()])
    }

    /// `SET <key> <value>`: sets a key that must not already exist.
    pub fn set(key: impl Into<Arg>, value: impl Into<Arg>) -> Cmd {
        status(vec![Arg::from("SET"), key.into(), value.into()])
    }

    /// `UPDATE <key> <value>`: updates a key that must already exist.
    pub fn update(key: impl Into<Arg>, value: impl Into<Arg>) -> Cmd {
        status(vec![Arg::from("UPDATE"), key.into(), value.into()])
    }

    /// `USET <k1> <v1> …`: sets or updates, returning the pair count.
    pub fn uset(pairs: impl IntoIterator<Item = (Arg, Arg)>) -> Cmd {
        int(pair_args("USET", pairs))
    }

    /// `DEL <key1> …`: returns how many of the keys were deleted.
    pub fn del<I, K>(keys: I) -> Cmd
    where
        I: IntoIterator<Item = K>,
        K: Into<Arg>,
    {
        let mut args = vec![Arg::from("DEL")];
        args.extend(keys.into_iter().map(Into::into));
        int(args)
    }

    /// `EXISTS <key1> …`: returns how many of the keys exist.
    pub fn exists<I, K>(keys: I) -> Cmd
    where
        I: IntoIterator<Item = K>,
        K: Into<Arg>,
    {
        let mut args = vec![Arg::from("EXISTS")];
        args.extend(keys.into_iter().map(Into::into));
        int(args)
    }

    /// `POP <key>`: deletes the key and returns its value.
    pub fn pop(key: impl Into<Arg>) -> Cmd {
        text(vec![Arg::from("POP"), key.into()])
    }

    /// `MPOP <key1> …`: deletes the keys and returns their values.
    pub fn mpop<I, K>(keys: I) -> Cmd
    where
        I: IntoIterator<Item = K>,
        K: Into<Arg>,
    {
        let mut args = vec![Arg::from("MPOP")];
        args.extend(keys.into_iter().map(Into::into));
        text_slice(args)
    }

    /// `MGET <key1> …`: per-key values, with the nil sentinel in the
    /// slot of every missing key.
    pub fn mget<I, K>(keys: I) -> Cmd
    where
        I: IntoIterator<Item = K>,
        K: Into<Arg>,
    {
        let mut args = vec![Arg::from("MGET")];
        args.extend(keys.into_iter().map(Into::into));
        slice(args)
    }

    /// `MSET <k1> <v1> …`: sets the pairs that don't exist yet and
    /// returns how many were set.
    pub fn mset(pairs: impl IntoIterator<Item = (Arg, Arg)>) -> Cmd {
        int(pair_args("MSET", pairs))
    }

    /// `MUPDATE <k1> <v1> …`: updates existing pairs and returns how
    /// many were updated.
    pub fn mupdate(pairs: impl IntoIterator<Item = (Arg, Arg)>) -> Cmd {
        int(pair_args("MUPDATE", pairs))
    }

    /// `SSET <k1> <v1> …`: sets all pairs only if none exist.
    pub fn sset(pairs: impl IntoIterator<Item = (Arg, Arg)>) -> Cmd {
        status(pair_args("SSET", pairs))
    }

    /// `SUPDATE <k1> <v1> …`: updates all pairs only if all exist.
    pub fn supdate(pairs: impl IntoIterator<Item = (Arg, Arg)>) -> Cmd {
        status(pair_args("SUPDATE", pairs))
    }

    /// `SDEL <key1> …`: deletes all keys only if all exist.
    pub fn sdel<I, K>(keys: I) -> Cmd
    where
        I: IntoIterator<Item = K>,
        K: Into<Arg>,
    {
        let mut args = vec![Arg::from("SDEL")];
        args.extend(keys.into_iter().map(Into::into));
        status(args)
    }

    /// `KEYLEN <key>`: byte length of the value under the key.
    pub fn keylen(key: impl Into<Arg>) -> Cmd {
        int(vec![Arg::from("KEYLEN"), key.into()])
    }

    /// `DBSIZE [entity]`: entry count of the current table or the given
    /// entity.
    pub fn dbsize(entity: &str) -> Cmd {
        if entity.is_empty() {
            int(vec![Arg::from("DBSIZE")])
        } else {
            int(vec![Arg::from("DBSIZE"), Arg::from(entity)])
        }
    }

    /// `FLUSHDB [entity]`: clears the current table or the given entity.
    pub fn flushdb(entity: &str) -> Cmd {
        if entity.is_empty() {
            status(vec![Arg::from("FLUSHDB")])
        } else {
            status(vec![Arg::from("FLUSHDB"), Arg::from(entity)])
        }
    }

    /// `LSKEYS [entity] [limit]`: up to `limit` keys, in no particular
    /// order. Zero means the server default of 10.
    pub fn lskeys(entity: &str, limit: i64) -> Cmd {
        let mut args = vec![Arg::from("LSKEYS")];
        if !entity.is_empty() {
            args.push(Arg::from(entity));
        }
        if limit > 0 {
            args.push(Arg::from(limit));
        }
        text_slice(args)
    }

    // Lists. The server multiplexes sub-actions under LGET/LMOD; the
    // split builders below are the canonical surface.

    /// `LGET <key>`: every element of the list.
    pub fn lget(key: impl Into<Arg>) -> Cmd {
        text_slice(vec![Arg::from("LGET"), key.into()])
    }

    /// `LGET <key> limit <n>`.
    pub fn lget_limit(key: impl Into<Arg>, limit: i64) -> Cmd {
        text_slice(vec![
            Arg::from("LGET"),
            key.into(),
            Arg::from("limit"),
            Arg::from(limit),
        ])
    }

    /// `LGET <key> len`.
    pub fn lget_len(key: impl Into<Arg>) -> Cmd {
        int(vec![Arg::from("LGET"), key.into(), Arg::from("len")])
    }

    /// `LGET <key> valueat <index>`.
    pub fn lget_value_at(key: impl Into<Arg>, index: i64) -> Cmd {
        text(vec![
            Arg::from("LGET"),
            key.into(),
            Arg::from("valueat"),
            Arg::from(index),
        ])
    }

    /// `LGET <key> first`.
    pub fn lget_first(key: impl Into<Arg>) -> Cmd {
        text(vec![Arg::from("LGET"), key.into(), Arg::from("first")])
    }

    /// `LGET <key> last`.
    pub fn lget_last(key: impl Into<Arg>) -> Cmd {
        text(vec![Arg::from("LGET"), key.into(), Arg::from("last")])
    }

    /// `LGET <key> range <start> [stop]`: `[start, stop)`, or everything
    /// from `start` when `stop` is negative.
    pub fn lget_range(key: impl Into<Arg>, start: i64, stop: i64) -> Cmd {
        let mut args = vec![
            Arg::from("LGET"),
            key.into(),
            Arg::from("range"),
            Arg::from(start),
        ];
        if stop > -1 {
            args.push(Arg::from(stop));
        }
        text_slice(args)
    }

    /// `LSET <key> [values…]`: creates a list, empty or seeded.
    pub fn lset<I, V>(key: impl Into<Arg>, values: I) -> Cmd
    where
        I: IntoIterator<Item = V>,
        V: Into<Arg>,
    {
        let mut args = vec![Arg::from("LSET"), key.into()];
        args.extend(values.into_iter().map(Into::into));
        status(args)
    }

    /// `LMOD <key> push <elements…>`.
    pub fn lmod_push<I, V>(key: impl Into<Arg>, elements: I) -> Cmd
    where
        I: IntoIterator<Item = V>,
        V: Into<Arg>,
    {
        let mut args = vec![Arg::from("LMOD"), key.into(), Arg::from("push")];
        args.extend(elements.into_iter().map(Into::into));
        status(args)
    }

    /// `LMOD <key> insert <index> <value>`.
    pub fn lmod_insert(key: impl Into<Arg>, index: i64, value: impl Into<Arg>) -> Cmd {
        status(vec![
            Arg::from("LMOD"),
            key.into(),
            Arg::from("insert"),
            Arg::from(index),
            value.into(),
        ])
    }

    /// `LMOD <key> pop [index]`: pops the tail, or the given index.
    pub fn lmod_pop(key: impl Into<Arg>, index: i64) -> Cmd {
        let mut args = vec![Arg::from("LMOD"), key.into(), Arg::from("pop")];
        if index > 0 {
            args.push(Arg::from(index));
        }
        text(args)
    }

    /// `LMOD <key> remove <index>`.
    pub fn lmod_remove(key: impl Into<Arg>, index: i64) -> Cmd {
        status(vec![
            Arg::from("LMOD"),
            key.into(),
            Arg::from("remove"),
            Arg::from(index),
        ])
    }

    /// `LMOD <key> clear`.
    pub fn lmod_clear(key: impl Into<Arg>) -> Cmd {
        status(vec![Arg::from("LMOD"), key.into(), Arg::from("clear")])
    }

    // DDL and introspection.

    /// `USE <entity>`: selects the connection's table or keyspace, FQE
    /// syntax (`<keyspace>:<table>`).
    pub fn use_entity(entity: &str) -> Cmd {
        status(vec![Arg::from("USE"), Arg::from(entity)])
    }

    /// `CREATE <entity>`: a new keyspace.
    pub fn create_keyspace(entity: &str) -> Cmd {
        status(vec![Arg::from("CREATE"), Arg::from(entity)])
    }

    /// `CREATE TABLE <entity> <model>(<args>) [properties…]`.
    ///
    /// Only the keymap model is currently supported server-side;
    /// everything after `CREATE TABLE` is case sensitive.
    pub fn create_table(table: &str, model: &str, model_args: &[&str], properties: &[&str]) -> Cmd {
        let mut args = vec![
            Arg::from("CREATE"),
            Arg::from("TABLE"),
            Arg::from(table),
            Arg::from(format!("{model}({})", model_args.join(","))),
        ];
        args.extend(properties.iter().map(|p| Arg::from(*p)));
        status(args)
    }

    /// `DROP KEYSPACE <keyspace>`.
    pub fn drop_keyspace(keyspace: &str) -> Cmd {
        status(vec![
            Arg::from("DROP"),
            Arg::from("KEYSPACE"),
            Arg::from(keyspace),
        ])
    }

    /// `DROP TABLE <table>`.
    pub fn drop_table(table: &str) -> Cmd {
        status(vec![
            Arg::from("DROP"),
            Arg::from("TABLE"),
            Arg::from(table),
        ])
    }

    /// `INSPECT KEYSPACE [keyspace]`: the table names within.
    pub fn inspect_keyspace(keyspace: &str) -> Cmd {
        text_slice(vec![
            Arg::from("INSPECT"),
            Arg::from("KEYSPACE"),
            Arg::from(keyspace),
        ])
    }

    /// `INSPECT KEYSPACES`: every keyspace name.
    pub fn inspect_keyspaces() -> Cmd {
        text_slice(vec![Arg::from("INSPECT"), Arg::from("KEYSPACES")])
    }

    /// `INSPECT TABLE <table>`: the table's syntactical description.
    pub fn inspect_table(table: &str) -> Cmd {
        text_slice(vec![
            Arg::from("INSPECT"),
            Arg::from("TABLE"),
            Arg::from(table),
        ])
    }

    /// `WHEREAMI`: current keyspace, and table when one is selected.
    pub fn whereami() -> Cmd {
        text_slice(vec![Arg::from("WHEREAMI")])
    }

    /// `MKSNAP [name]`: snapshots, optionally into `rsnap/<name>`.
    pub fn mksnap(name: &str) -> Cmd {
        if name.is_empty() {
            status(vec![Arg::from("MKSNAP")])
        } else {
            status(vec![Arg::from("MKSNAP"), Arg::from(name)])
        }
    }

    /// `SYS INFO <property>`: static properties (`version`, `protocol`,
    /// `protover`).
    pub fn sys_info(property: &str) -> Cmd {
        text(vec![
            Arg::from("SYS"),
            Arg::from("INFO"),
            Arg::from(property),
        ])
    }

    /// `SYS METRIC <metric>`: runtime metrics (`health`, `storage`).
    pub fn sys_metric(metric: &str) -> Cmd {
        text(vec![
            Arg::from("SYS"),
            Arg::from("METRIC"),
            Arg::from(metric),
        ])
    }

    // Authn.

    /// `AUTH <username> <token>`: log the connection in.
    pub fn login(username: &str, token: &str) -> Cmd {
        status(vec![
            Arg::from("AUTH"),
            Arg::from(username),
            Arg::from(token),
        ])
    }

    /// `AUTH LOGOUT`.
    pub fn logout() -> Cmd {
        status(vec![Arg::from("AUTH"), Arg::from("LOGOUT")])
    }

    /// `AUTH ADDUSER <username>`: creates a user, returning the token.
    pub fn add_user(username: &str) -> Cmd {
        text(vec![
            Arg::from("AUTH"),
            Arg::from("ADDUSER"),
            Arg::from(username),
        ])
    }

    /// `AUTH DELUSER <username>`.
    pub fn del_user(username: &str) -> Cmd {
        status(vec![
            Arg::from("AUTH"),
            Arg::from("DELUSER"),
            Arg::from(username),
        ])
    }

    /// `AUTH LISTUSER`.
    pub fn list_users() -> Cmd {
        text_slice(vec![Arg::from("AUTH"), Arg::from("LISTUSER")])
    }

    /// `AUTH WHOAMI`: the authenticated user's id.
    pub fn whoami() -> Cmd {
        text(vec![Arg::from("AUTH"), Arg::from("WHOAMI")])
    }

    /// `AUTH CLAIM <origin-key>`: claims the root account.
    pub fn claim(origin_key: &str) -> Cmd {
        text(vec![
            Arg::from("AUTH"),
            Arg::from("CLAIM"),
            Arg::from(origin_key),
        ])
    }

    /// `RESTORE [origin-key] <username>`: regenerates a user's token.
    /// Unlike the other authn actions, this is not an `AUTH` sub-action.
    pub fn restore(origin_key: &str, username: &str) -> Cmd {
        if origin_key.is_empty() {
            text(vec![Arg::from("RESTORE"), Arg::from(username)])
        } else {
            text(vec![
                Arg::from("RESTORE"),
                Arg::from(origin_key),
                Arg::from(username),
            ])
        }
    }
}

impl Client {
    async fn execute(&self, mut cmd: Cmd) -> Result<Cmd, Error> {
        self.process(&mut cmd).await?;
        Ok(cmd)
    }

    /// Either returns `HEY!` or echoes `message` back.
    pub async fn heya(&self, message: &str) -> Result<String, Error> {
        self.execute(Cmd::heya(message)).await?.text()
    }

    /// The value of `key` in the current table. Fails with the nil
    /// sentinel ([`Error::is_nil`]) when the key does not exist.
    pub async fn get(&self, key: impl Into<Arg>) -> Result<String, Error> {
        self.execute(Cmd::get(key)).await?.text()
    }

    /// The raw bytes of `key`, for binary-safe values.
    pub async fn get_bytes(&self, key: impl Into<Arg>) -> Result<Vec<u8>, Error> {
        self.execute(Cmd::get(key)).await?.bytes()
    }

    /// Sets `key` to `value`; the key must not already exist, otherwise
    /// the server reports an overwrite error (status 2).
    pub async fn set(&self, key: impl Into<Arg>, value: impl Into<Arg>) -> Result<(), Error> {
        self.execute(Cmd::set(key, value)).await?.status()
    }

    /// Updates an existing key.
    pub async fn update(&self, key: impl Into<Arg>, value: impl Into<Arg>) -> Result<(), Error> {
        self.execute(Cmd::update(key, value)).await?.status()
    }

    /// Sets or updates each pair; returns how many were written.
    pub async fn uset(
        &self,
        pairs: impl IntoIterator<Item = (Arg, Arg)>,
    ) -> Result<i64, Error> {
        self.execute(Cmd::uset(pairs)).await?.int64()
    }

    /// Deletes the keys; returns how many existed.
    pub async fn del<I, K>(&self, keys: I) -> Result<i64, Error>
    where
        I: IntoIterator<Item = K>,
        K: Into<Arg>,
    {
        self.execute(Cmd::del(keys)).await?.int64()
    }

    /// Counts how many of the keys exist.
    pub async fn exists<I, K>(&self, keys: I) -> Result<i64, Error>
    where
        I: IntoIterator<Item = K>,
        K: Into<Arg>,
    {
        self.execute(Cmd::exists(keys)).await?.int64()
    }

    /// Deletes `key` and returns the value it held.
    pub async fn pop(&self, key: impl Into<Arg>) -> Result<String, Error> {
        self.execute(Cmd::pop(key)).await?.text()
    }

    /// Deletes the keys and returns their values.
    pub async fn mpop<I, K>(&self, keys: I) -> Result<Vec<String>, Error>
    where
        I: IntoIterator<Item = K>,
        K: Into<Arg>,
    {
        self.execute(Cmd::mpop(keys)).await?.strings()
    }

    /// Per-key lookup; missing keys come back as [`Value::Nil`] in their
    /// slot rather than failing the call.
    pub async fn mget<I, K>(&self, keys: I) -> Result<Vec<Value>, Error>
    where
        I: IntoIterator<Item = K>,
        K: Into<Arg>,
    {
        self.execute(Cmd::mget(keys)).await?.values()
    }

    pub async fn mset(
        &self,
        pairs: impl IntoIterator<Item = (Arg, Arg)>,
    ) -> Result<i64, Error> {
        self.execute(Cmd::mset(pairs)).await?.int64()
    }

    pub async fn mupdate(
        &self,
        pairs: impl IntoIterator<Item = (Arg, Arg)>,
    ) -> Result<i64, Error> {
        self.execute(Cmd::mupdate(pairs)).await?.int64()
    }

    /// Sets all pairs only if none of the keys exist.
    pub async fn sset(
        &self,
        pairs: impl IntoIterator<Item = (Arg, Arg)>,
    ) -> Result<(), Error> {
        self.execute(Cmd::sset(pairs)).await?.status()
    }

    /// Updates all pairs only if every key exists; a single missing key
    /// yields the nil sentinel.
    pub async fn supdate(
        &self,
        pairs: impl IntoIterator<Item = (Arg, Arg)>,
    ) -> Result<(), Error> {
        self.execute(Cmd::supdate(pairs)).await?.status()
    }

    /// Deletes all keys only if every one exists.
    pub async fn sdel<I, K>(&self, keys: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = K>,
        K: Into<Arg>,
    {
        self.execute(Cmd::sdel(keys)).await?.status()
    }

    /// Byte length of the value under `key`.
    pub async fn keylen(&self, key: impl Into<Arg>) -> Result<i64, Error> {
        self.execute(Cmd::keylen(key)).await?.int64()
    }

    /// Entry count of the current table, or of `entity` when non-empty.
    pub async fn dbsize(&self, entity: &str) -> Result<i64, Error> {
        self.execute(Cmd::dbsize(entity)).await?.int64()
    }

    /// Clears the current table, or `entity` (FQE) when non-empty.
    pub async fn flushdb(&self, entity: &str) -> Result<(), Error> {
        self.execute(Cmd::flushdb(entity)).await?.status()
    }

    /// Up to `limit` keys from the current table or `entity`.
    pub async fn lskeys(&self, entity: &str, limit: i64) -> Result<Vec<String>, Error> {
        self.execute(Cmd::lskeys(entity, limit)).await?.strings()
    }

    pub async fn lget(&self, key: impl Into<Arg>) -> Result<Vec<String>, Error> {
        self.execute(Cmd::lget(key)).await?.strings()
    }

    pub async fn lget_limit(
        &self,
        key: impl Into<Arg>,
        limit: i64,
    ) -> Result<Vec<String>, Error> {
        self.execute(Cmd::lget_limit(key, limit)).await?.strings()
    }

    pub async fn lget_len(&self, key: impl Into<Arg>) -> Result<i64, Error> {
        self.execute(Cmd::lget_len(key)).await?.int64()
    }

    pub async fn lget_value_at(
        &self,
        key: impl Into<Arg>,
        index: i64,
    ) -> Result<String, Error> {
        self.execute(Cmd::lget_value_at(key, index)).await?.text()
    }

    pub async fn lget_first(&self, key: impl Into<Arg>) -> Result<String, Error> {
        self.execute(Cmd::lget_first(key)).await?.text()
    }

    pub async fn lget_last(&self, key: impl Into<Arg>) -> Result<String, Error> {
        self.execute(Cmd::lget_last(key)).await?.text()
    }

    /// Elements in `[start, stop)`, or from `start` onwards when `stop`
    /// is negative.
    pub async fn lget_range(
        &self,
        key: impl Into<Arg>,
        start: i64,
        stop: i64,
    ) -> Result<Vec<String>, Error> {
        self.execute(Cmd::lget_range(key, start, stop))
            .await?
            .strings()
    }

    /// Creates a list under `key`, seeded with `values`.
    pub async fn lset<I, V>(&self, key: impl Into<Arg>, values: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = V>,
        V: Into<Arg>,
    {
        self.execute(Cmd::lset(key, values)).await?.status()
    }

    pub async fn lmod_push<I, V>(&self, key: impl Into<Arg>, elements: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = V>,
        V: Into<Arg>,
    {
        self.execute(Cmd::lmod_push(key, elements)).await?.status()
    }

    pub async fn lmod_insert(
        &self,
        key: impl Into<Arg>,
        index: i64,
        value: impl Into<Arg>,
    ) -> Result<(), Error> {
        self.execute(Cmd::lmod_insert(key, index, value))
            .await?
            .status()
    }

    /// Pops the tail of the list, or the element at `index` when
    /// positive.
    pub async fn lmod_pop(&self, key: impl Into<Arg>, index: i64) -> Result<String, Error> {
        self.execute(Cmd::lmod_pop(key, index)).await?.text()
    }

    pub async fn lmod_remove(&self, key: impl Into<Arg>, index: i64) -> Result<(), Error> {
        self.execute(Cmd::lmod_remove(key, index)).await?.status()
    }

    pub async fn lmod_clear(&self, key: impl Into<Arg>) -> Result<(), Error> {
        self.execute(Cmd::lmod_clear(key)).await?.status()
    }

    /// Selects the entity (`<keyspace>` or `<keyspace>:<table>`) for the
    /// connection that happens to run it. For a default that applies to
    /// every pooled connection, set [`Options::table`](crate::Options).
    pub async fn use_entity(&self, entity: &str) -> Result<(), Error> {
        self.execute(Cmd::use_entity(entity)).await?.status()
    }

    pub async fn create_keyspace(&self, entity: &str) -> Result<(), Error> {
        self.execute(Cmd::create_keyspace(entity)).await?.status()
    }

    pub async fn create_table(
        &self,
        table: &str,
        model: &str,
        model_args: &[&str],
        properties: &[&str],
    ) -> Result<(), Error> {
        self.execute(Cmd::create_table(table, model, model_args, properties))
            .await?
            .status()
    }

    pub async fn drop_keyspace(&self, keyspace: &str) -> Result<(), Error> {
        self.execute(Cmd::drop_keyspace(keyspace)).await?.status()
    }

    pub async fn drop_table(&self, table: &str) -> Result<(), Error> {
        self.execute(Cmd::drop_table(table)).await?.status()
    }

    pub async fn inspect_keyspace(&self, keyspace: &str) -> Result<Vec<String>, Error> {
        self.execute(Cmd::inspect_keyspace(keyspace))
            .await?
            .strings()
    }

    pub async fn inspect_keyspaces(&self) -> Result<Vec<String>, Error> {
        self.execute(Cmd::inspect_keyspaces()).await?.strings()
    }

    pub async fn inspect_table(&self, table: &str) -> Result<Vec<String>, Error> {
        self.execute(Cmd::inspect_table(table)).await?.strings()
    }

    /// The current keyspace, plus the table when one is selected.
    pub async fn whereami(&self) -> Result<Vec<String>, Error> {
        self.execute(Cmd::whereami()).await?.strings()
    }

    /// Takes a snapshot; requires snapshotting enabled server-side
    /// unless a name is given.
    pub async fn mksnap(&self, name: &str) -> Result<(), Error> {
        self.execute(Cmd::mksnap(name)).await?.status()
    }

    pub async fn sys_info(&self, property: &str) -> Result<String, Error> {
        self.execute(Cmd::sys_info(property)).await?.text()
    }

    pub async fn sys_metric(&self, metric: &str) -> Result<String, Error> {
        self.execute(Cmd::sys_metric(metric)).await?.text()
    }

    /// Creates a user and returns the issued token. Requires root.
    pub async fn add_user(&self, username: &str) -> Result<String, Error> {
        self.execute(Cmd::add_user(username)).await?.text()
    }

    pub async fn del_user(&self, username: &str) -> Result<(), Error> {
        self.execute(Cmd::del_user(username)).await?.status()
    }

    pub async fn list_users(&self) -> Result<Vec<String>, Error> {
        self.execute(Cmd::list_users()).await?.strings()
    }

    /// Claims the root account with the origin key, returning the root
    /// token.
    pub async fn claim(&self, origin_key: &str) -> Result<String, Error> {
        self.execute(Cmd::claim(origin_key)).await?.text()
    }

    /// Regenerates and returns the token for `username`.
    pub async fn restore(&self, origin_key: &str, username: &str) -> Result<String, Error> {
        self.execute(Cmd::restore(origin_key, username)).await?.text()
    }
}

/// Connection-scoped commands. Authn state lives on the server side of
/// one connection, which is why these are only available on the
/// dedicated-connection client.
impl ConnClient {
    async fn execute(&self, mut cmd: Cmd) -> Result<Cmd, Error> {
        self.process(&mut cmd).await?;
        Ok(cmd)
    }

    /// Logs this connection in. Fails with bad-credentials (status 10)
    /// when the pair is invalid.
    pub async fn login(&self, username: &str, token: &str) -> Result<(), Error> {
        self.execute(Cmd::login(username, token)).await?.status()
    }

    /// Logs the connection's current user out.
    pub async fn logout(&self) -> Result<(), Error> {
        self.execute(Cmd::logout()).await?.status()
    }

    /// Selects this connection's entity, FQE syntax.
    pub async fn use_entity(&self, entity: &str) -> Result<(), Error> {
        self.execute(Cmd::use_entity(entity)).await?.status()
    }

    /// The AuthID of the logged-in user.
    pub async fn whoami(&self) -> Result<String, Error> {
        self.execute(Cmd::whoami()).await?.text()
    }

    pub async fn heya(&self, message: &str) -> Result<String, Error> {
        self.execute(Cmd::heya(message)).await?.text()
    }

    pub async fn get(&self, key: impl Into<Arg>) -> Result<String, Error> {
        self.execute(Cmd::get(key)).await?.text()
    }

    pub async fn set(&self, key: impl Into<Arg>, value: impl Into<Arg>) -> Result<(), Error> {
        self.execute(Cmd::set(key, value)).await?.status()
    }
}
