use tether::heap::{Heap, HeapOptions};

fn main() {
    let heap = Heap::new(HeapOptions::default().with_verbose(true));
    let mutator = heap.mutator();
    let my_obj = mutator.allocate(42i32); // note that this object is not passed to `collect` and it will be recycled during GC cycle
    let mut my_obj2 = mutator.allocate(44i32); // my_obj2 is kept so it will survive next GC cycle
    let mut my_weak = mutator.allocate_weak(my_obj2).unwrap(); // allocate weak reference for my_obj2
    let mut my_weak2 = mutator.allocate_weak(my_obj).unwrap(); // allocate weak reference for my_obj

    println!("my_weak holds: {}", **my_weak.upgrade(&mutator).unwrap());
    println!("my_weak2 holds: {}", **my_weak2.upgrade(&mutator).unwrap());
    mutator.collect(&mut [&mut my_obj2, &mut my_weak, &mut my_weak2]);

    println!("my_weak2 is empty: {}", my_weak2.upgrade(&mutator).is_none());
    println!("my_weak holds: {}", **my_weak.upgrade(&mutator).unwrap());
    println!("{}", heap.statistics());
}
