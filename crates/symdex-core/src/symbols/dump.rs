//! Human-readable symbol table listings.
//!
//! Fixed-width columns: index, id, the debug/synthetic/external flag triple,
//! type, file address (or scalar value), load address, size, flags word and
//! name.

use std::fmt::{self, Write};
use std::sync::Arc;

use super::symbol::Symbol;
use super::symtab::Symtab;
use crate::intern::StringPool;
use crate::types::Address;

/// Row order for [`Symtab::dump`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortOrder
{
    /// Insertion order.
    #[default]
    None,
    ByName,
    ByAddress,
}

const HEADER: &str = concat!(
    "               Debug symbol\n",
    "               |Synthetic symbol\n",
    "               ||Externally Visible\n",
    "               |||\n",
    "Index   UserID DSX Type            File Address/Value Load Address       Size               Flags      Name\n",
    "------- ------ --- --------------- ------------------ ------------------ ------------------ ---------- ----------------------------------\n",
);

const EMPTY_ADDRESS_COLUMN: &str = "                   ";

fn flag(set: bool, c: char) -> char
{
    if set { c } else { ' ' }
}

fn write_symbol<W: Write>(
    out: &mut W,
    pool: &StringPool,
    index: u32,
    symbol: &Symbol,
    load_address: Option<&dyn Fn(Address) -> Option<Address>>,
) -> fmt::Result
{
    write!(
        out,
        "[{index:>5}] {:>6} {}{}{} {:<15} ",
        symbol.id(),
        flag(symbol.is_debug(), 'D'),
        flag(symbol.is_synthetic(), 'S'),
        flag(symbol.is_external(), 'X'),
        symbol.symbol_type().as_str(),
    )?;

    write!(out, "0x{:016x} ", symbol.value().raw())?;
    match symbol
        .file_address()
        .and_then(|address| load_address.and_then(|resolve| resolve(address)))
    {
        Some(load) => write!(out, "0x{:016x} ", load.value())?,
        None => out.write_str(EMPTY_ADDRESS_COLUMN)?,
    }

    let name = symbol.name().map(|name| pool.resolve(name));
    writeln!(
        out,
        "0x{:016x} 0x{:08x} {}",
        symbol.byte_size(),
        symbol.flags(),
        name.as_deref().unwrap_or("")
    )
}

impl Symtab
{
    /// Write the whole table to `out`.
    ///
    /// `load_address` maps file addresses to load addresses when the image
    /// is loaded in a target; without it the load address column is blank.
    /// The rows are copied out before formatting, so `load_address` may query
    /// the table.
    pub fn dump<W: Write>(
        &self,
        out: &mut W,
        load_address: Option<&dyn Fn(Address) -> Option<Address>>,
        sort_order: SortOrder,
    ) -> fmt::Result
    {
        let pool = self.pool().clone();
        let _lock = self.lock();

        let collect = |inner: &super::symtab::SymtabInner| -> (usize, Vec<(u32, Symbol)>) {
            let order: Vec<u32> = match sort_order {
                SortOrder::None => (0..inner.symbols.len() as u32).collect(),
                SortOrder::ByName => {
                    let mut named: Vec<(Arc<str>, u32)> = inner
                        .symbols
                        .iter()
                        .enumerate()
                        .map(|(pos, symbol)| {
                            let name = symbol.name().map_or_else(|| Arc::from(""), |name| pool.resolve(name));
                            (name, pos as u32)
                        })
                        .collect();
                    named.sort();
                    named.into_iter().map(|(_, pos)| pos).collect()
                }
                SortOrder::ByAddress => inner.file_addr_to_index.iter().map(|entry| entry.data).collect(),
            };
            let rows = order
                .into_iter()
                .filter_map(|pos| inner.symbols.get(pos as usize).map(|symbol| (pos, symbol.clone())))
                .collect();
            (inner.symbols.len(), rows)
        };
        let (num_symbols, rows) = match sort_order {
            SortOrder::ByAddress => self.read_with_addresses(collect),
            _ => self.read_plain(collect),
        };

        if let Some(name) = self.object_name() {
            write!(out, "{name}, ")?;
        }
        write!(out, "Symtab, num_symbols = {num_symbols}")?;
        if num_symbols == 0 {
            return writeln!(out);
        }
        match sort_order {
            SortOrder::None => writeln!(out, ":")?,
            SortOrder::ByName => writeln!(out, " (sorted by name):")?,
            SortOrder::ByAddress => writeln!(out, " (sorted by address):")?,
        }

        out.write_str(HEADER)?;
        for (pos, symbol) in &rows {
            write_symbol(out, &pool, *pos, symbol, load_address)?;
        }
        Ok(())
    }

    /// Write the symbols at `indexes`, in the given order.
    pub fn dump_indexes<W: Write>(&self, out: &mut W, indexes: &[u32]) -> fmt::Result
    {
        let pool = self.pool().clone();
        self.read_plain(|inner| {
            writeln!(
                out,
                "Symtab {} symbol indexes ({} symbols total):",
                indexes.len(),
                inner.symbols.len()
            )?;
            out.write_str(HEADER)?;
            for &pos in indexes {
                if let Some(symbol) = inner.symbols.get(pos as usize) {
                    write_symbol(out, &pool, pos, symbol, None)?;
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::symbols::symbol::{Mangled, SymbolValue};
    use crate::types::SymbolType;

    fn table() -> Symtab
    {
        let pool = StringPool::shared();
        let mut symtab = Symtab::new(pool.clone()).with_object_name("a.out");
        symtab.add_symbol(Symbol::at_address(&pool, 1, "zeta", SymbolType::Code, 0x2000).with_size(0x10));
        symtab.add_symbol(
            Symbol::at_address(&pool, 2, "alpha", SymbolType::Data, 0x1000)
                .with_size(0x8)
                .with_external(true),
        );
        symtab
    }

    #[test]
    fn test_header_and_rows()
    {
        let symtab = table();
        let mut out = String::new();
        symtab.dump(&mut out, None, SortOrder::None).unwrap();

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "a.out, Symtab, num_symbols = 2:");
        assert!(lines[5].starts_with("Index   UserID DSX Type"));
        assert!(lines[7].starts_with("[    0]      1     Code"));
        assert!(lines[7].ends_with(" zeta"));
        assert!(lines[8].starts_with("[    1]      2   X Data"));
    }

    #[test]
    fn test_sorted_dumps()
    {
        let symtab = table();

        let mut by_name = String::new();
        symtab.dump(&mut by_name, None, SortOrder::ByName).unwrap();
        assert!(by_name.starts_with("a.out, Symtab, num_symbols = 2 (sorted by name):"));
        assert!(by_name.find("alpha").unwrap() < by_name.find("zeta").unwrap());
        assert_eq!(by_name.lines().filter(|line| line.starts_with('[')).count(), 2);

        let mut by_address = String::new();
        symtab.dump(&mut by_address, None, SortOrder::ByAddress).unwrap();
        assert!(by_address.contains("(sorted by address):"));
        assert!(by_address.find("alpha").unwrap() < by_address.find("zeta").unwrap());
    }

    #[test]
    fn test_load_address_column()
    {
        let symtab = table();
        let slide = |address: Address| address.checked_add(0x1_0000_0000);
        let mut out = String::new();
        symtab.dump(&mut out, Some(&slide), SortOrder::None).unwrap();
        assert!(out.contains("0x0000000000002000 0x0000000100002000 0x0000000000000010"));
    }

    #[test]
    fn test_by_name_lists_anonymous_symbols()
    {
        let mut symtab = table();
        symtab.add_symbol(Symbol::new(3, Mangled::default(), SymbolType::Data, SymbolValue::FileAddress(Address::new(0x3000))));

        let mut out = String::new();
        symtab.dump(&mut out, None, SortOrder::ByName).unwrap();
        let rows: Vec<&str> = out.lines().filter(|line| line.starts_with('[')).collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].starts_with("[    2]      3"));
    }

    #[test]
    fn test_load_address_callback_may_query_the_table()
    {
        let symtab = table();
        let resolve = |address: Address| symtab.find_symbol_at_file_address(address).map(|_| address);

        for order in [SortOrder::None, SortOrder::ByName, SortOrder::ByAddress] {
            let mut out = String::new();
            symtab.dump(&mut out, Some(&resolve), order).unwrap();
            assert!(out.contains("0x0000000000002000 0x0000000000002000 "));
        }
    }

    #[test]
    fn test_dump_indexes()
    {
        let symtab = table();
        let mut out = String::new();
        symtab.dump_indexes(&mut out, &[1]).unwrap();
        assert!(out.starts_with("Symtab 1 symbol indexes (2 symbols total):"));
        assert!(out.contains("alpha"));
        assert!(!out.contains("zeta"));
    }

    #[test]
    fn test_empty_table()
    {
        let symtab = Symtab::new(StringPool::shared());
        let mut out = String::new();
        symtab.dump(&mut out, None, SortOrder::ByAddress).unwrap();
        assert_eq!(out, "Symtab, num_symbols = 0\n");
    }
}
