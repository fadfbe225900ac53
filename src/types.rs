use crate::err::Error;

/// An identifier for a logical processor taking part in the simulation.
///
/// ProcessorIds are assigned starting from 0 and must be below the processor count fixed when the
/// [crate::Memory] or [crate::PhaseBarrier] was constructed.
pub type ProcessorId = usize;

/// A number uniquely identifying a cell within one [crate::Memory]. Cells are numbered in
/// creation order starting from 0.
pub type CellId = usize;

/// The seed a [crate::PhaseBarrier] hands to its waiters for the current round. It advances by
/// one every completed round.
pub type Seed = u64;

/// Make sure `processor` may take part in a simulation with `num_processors` processors.
pub(crate) fn check_processor_id(
    processor: ProcessorId,
    num_processors: usize,
) -> Result<(), Error> {
    if processor < num_processors {
        Ok(())
    } else {
        Err(Error::ProcessorOutOfRange {
            processor,
            num_processors,
        })
    }
}

/// Obtain the number of bits needed to tell `num_processors` processors apart. For example, 5
/// processors need 3 bits, because the largest id, 4, is 100 in binary.
pub(crate) fn get_bit_length_of_num_processors(num_processors: usize) -> u32 {
    match num_processors {
        0 | 1 => 0,
        n => usize::BITS - (n - 1).leading_zeros(),
    }
}
