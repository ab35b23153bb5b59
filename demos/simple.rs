use seekdb::{MatchPolicy, OpenOptions};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let mut db = OpenOptions::new().open()?;

    db.put(b"apple", b"1")?;
    db.put(b"cherry", b"3")?;
    db.put(b"elder", b"5")?;

    let mut cursor = db.cursor()?;
    cursor.first()?;
    while cursor.is_valid() {
        println!("{:?} => {:?}", cursor.key()?, cursor.value()?);
        cursor.next()?;
    }

    cursor.seek(b"banana", MatchPolicy::LessOrEqual)?;
    println!("le(banana) -> {:?}", cursor.key()?);

    cursor.seek(b"banana", MatchPolicy::GreaterOrEqual)?;
    println!("ge(banana) -> {:?}", cursor.key()?);

    cursor.close()?;
    db.close()?;
    Ok(())
}
